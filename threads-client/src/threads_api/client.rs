//! Core Threads API client: authenticated requests and every endpoint wrapper.

use crate::config::{ClientConfig, Credentials};
use crate::error::{Error, Result};
use crate::threads_api::{
    containers::{Container, ContainerStatus, IdResponse, MediaSpec, MediaType, PollOptions},
    posts::{DeleteResponse, ListOptions, POST_FIELDS, Post, SearchType},
    types::{Page, Pager},
    users::{PROFILE_FIELDS, PUBLISHING_LIMIT_FIELDS, PublishingLimit, UserProfile},
};
use crate::token::TokenManager;
use crate::transport::{RequestSpec, Response, Transport};
use crate::validation;
use jiff::Timestamp;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Client for the Threads Graph API.
///
/// Cloning is cheap: clones share the HTTP connection pool and the [`TokenManager`], so a token
/// obtained or refreshed through one clone is immediately used by all of them. Any number of
/// operations may run concurrently on the same client.
///
/// Every call aborts with [`Error::Cancelled`] once the client's cancellation token fires; see
/// [`ThreadsClient::with_cancellation`].
#[derive(Debug, Clone)]
pub struct ThreadsClient {
    transport: Transport,
    tokens: Arc<TokenManager>,
    config: Arc<ClientConfig>,
    cancel: CancellationToken,
}

impl ThreadsClient {
    /// Creates a client with no token yet.
    ///
    /// Obtain one with [`crate::oauth::login`], restore one through [`TokenManager::restore`], or
    /// inject one with [`TokenManager::set_token`].
    pub fn new(credentials: Credentials, config: ClientConfig) -> Result<Self> {
        let transport = Transport::new(&config)?;
        let tokens = Arc::new(TokenManager::new(credentials, transport.clone()));
        Ok(Self {
            transport,
            tokens,
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        })
    }

    /// A clone of this client whose calls abort when `cancel` fires.
    ///
    /// The clone still shares the token and connection pool with `self`.
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Id of the authenticated user.
    pub async fn user_id(&self) -> Result<String> {
        self.tokens.user_id().await
    }

    fn path(&self, path: &str) -> String {
        self.config.versioned(path)
    }

    /// Sends `spec` with the current access token attached.
    ///
    /// Fails without touching the network when there is no token or it has expired.
    pub(crate) async fn send(&self, spec: RequestSpec) -> Result<Response> {
        let Some(state) = self.tokens.snapshot().await else {
            return Err(Error::authentication("not logged in: no access token available"));
        };
        if state.is_expired(Timestamp::now()) {
            return Err(Error::authentication(format!(
                "access token expired at {}, log in again",
                state.expires_at
            )));
        }
        self.transport
            .execute(spec, Some(&state.access_token), &self.cancel)
            .await
    }

    /// Fetches the profile of the authenticated user.
    ///
    /// # Required Scopes
    ///
    /// * `threads_basic`
    ///
    /// # API Reference
    ///
    /// <https://developers.facebook.com/docs/threads/threads-profiles>
    #[instrument(skip(self), ret)]
    pub async fn get_me(&self) -> Result<UserProfile> {
        let spec = RequestSpec::get(self.path("me")).query("fields", PROFILE_FIELDS);
        self.send(spec).await?.json("user profile")
    }

    /// Fetches the publishing quota of the authenticated user.
    ///
    /// # API Reference
    ///
    /// <https://developers.facebook.com/docs/threads/troubleshooting#retrieve-publishing-quota-limit>
    #[instrument(skip(self), ret)]
    pub async fn publishing_limit(&self) -> Result<PublishingLimit> {
        let user_id = self.user_id().await?;
        let spec = RequestSpec::get(self.path(&format!("{user_id}/threads_publishing_limit")))
            .query("fields", PUBLISHING_LIMIT_FIELDS);
        let response = self.send(spec).await?;
        let page = Page::<PublishingLimit>::decode(&response.body)?;
        page.items.into_iter().next().ok_or_else(|| Error::Api {
            status: Some(response.status.as_u16()),
            message: "publishing limit response has no entries".to_string(),
            body: Some(String::from_utf8_lossy(&response.body).into_owned()),
            request_id: response.request_id(),
        })
    }

    /// Creates a media container for the authenticated user.
    ///
    /// `spec` is validated in full before anything is sent; an invalid spec results in a
    /// validation error naming the offending field and no network traffic.
    ///
    /// # Returns
    ///
    /// The id of the new container. It starts out `IN_PROGRESS`; see
    /// [`Self::wait_until_ready`].
    ///
    /// # Required Scopes
    ///
    /// * `threads_basic`
    /// * `threads_content_publish`
    ///
    /// # API Reference
    ///
    /// <https://developers.facebook.com/docs/threads/posts>
    #[instrument(skip(self, spec), fields(media_type = %spec.media_type.as_str()))]
    pub async fn create_container(&self, spec: &MediaSpec) -> Result<String> {
        spec.validate()?;
        let user_id = self.user_id().await?;
        let request =
            RequestSpec::post(self.path(&format!("{user_id}/threads"))).form(spec.to_form());
        let created: IdResponse = self.send(request).await?.json("container creation")?;
        tracing::debug!(container_id = %created.id, "created container");
        Ok(created.id)
    }

    /// Fetches the current state of a container. Makes exactly one request.
    #[instrument(skip(self))]
    pub async fn poll_status(&self, container_id: &str) -> Result<Container> {
        validation::require_id("container_id", container_id)?;
        let spec =
            RequestSpec::get(self.path(container_id)).query("fields", "id,status,error_message");
        self.send(spec).await?.json("container status")
    }

    /// Polls a container until it reaches a terminal status.
    ///
    /// Polls at most `options.max_attempts` times, sleeping `options.interval` in between, and
    /// returns as soon as the status is anything but `IN_PROGRESS`. An `ERROR` or `EXPIRED`
    /// container is returned as-is, with the server's detail; it is the caller's call what to do
    /// with it. Still `IN_PROGRESS` after the last poll is a timeout.
    #[instrument(skip(self))]
    pub async fn wait_until_ready(
        &self,
        container_id: &str,
        options: PollOptions,
    ) -> Result<Container> {
        validation::require_id("container_id", container_id)?;
        options.validate()?;

        for attempt in 1..=options.max_attempts {
            let container = self.poll_status(container_id).await?;
            if container.status.is_terminal() {
                tracing::debug!(attempt, status = %container.status, "container settled");
                return Ok(container);
            }
            tracing::trace!(attempt, "container still in progress");
            if attempt < options.max_attempts {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => {
                        return Err(Error::Cancelled(format!(
                            "waiting for container {container_id}"
                        )));
                    }
                    () = tokio::time::sleep(options.interval) => {}
                }
            }
        }

        Err(Error::Timeout(format!(
            "container {container_id} still {} after {} polls",
            ContainerStatus::InProgress,
            options.max_attempts
        )))
    }

    /// Publishes a processed container.
    ///
    /// `container` must have been observed `FINISHED`; any other status is rejected locally.
    ///
    /// # Returns
    ///
    /// The new [`Post`], carrying only its id.
    ///
    /// # API Reference
    ///
    /// <https://developers.facebook.com/docs/threads/posts#step-2--publish-a-threads-media-container>
    #[instrument(skip(self, container), fields(container_id = %container.id), ret)]
    pub async fn publish(&self, container: &Container) -> Result<Post> {
        validation::require_id("container_id", &container.id)?;
        if container.status != ContainerStatus::Finished {
            return Err(Error::validation(
                "status",
                format!(
                    "container {} is {}, only {} containers can be published",
                    container.id,
                    container.status,
                    ContainerStatus::Finished
                ),
            ));
        }
        let user_id = self.user_id().await?;
        let spec = RequestSpec::post(self.path(&format!("{user_id}/threads_publish")))
            .query("creation_id", container.id.clone());
        let published: IdResponse = self.send(spec).await?.json("publish response")?;
        Ok(Post {
            id: published.id,
            ..Post::default()
        })
    }

    /// Creates a container, waits for processing, and publishes it.
    ///
    /// A container that ends in `ERROR` or `EXPIRED` fails with [`Error::ContainerFailed`]
    /// carrying the server's detail.
    #[instrument(skip(self, spec), fields(media_type = %spec.media_type.as_str()))]
    pub async fn create_and_publish(&self, spec: &MediaSpec, options: PollOptions) -> Result<Post> {
        options.validate()?;
        let container_id = self.create_container(spec).await?;
        let container = self.ready_container(&container_id, options).await?;
        self.publish(&container).await
    }

    /// Publishes a carousel of 2 to 20 images and videos.
    ///
    /// Each item's container is created and processed in order, then the carousel container
    /// referencing them is created and published. Items are marked as carousel items
    /// automatically.
    #[instrument(skip(self, items, text), fields(items = items.len()))]
    pub async fn publish_carousel(
        &self,
        items: &[MediaSpec],
        text: Option<&str>,
        options: PollOptions,
    ) -> Result<Post> {
        options.validate()?;
        if !(validation::MIN_CAROUSEL_ITEMS..=validation::MAX_CAROUSEL_ITEMS).contains(&items.len())
        {
            return Err(Error::validation(
                "children",
                format!(
                    "carousel needs {} to {} items, got {}",
                    validation::MIN_CAROUSEL_ITEMS,
                    validation::MAX_CAROUSEL_ITEMS,
                    items.len()
                ),
            ));
        }
        let items: Vec<MediaSpec> = items
            .iter()
            .map(|item| MediaSpec {
                is_carousel_item: true,
                ..item.clone()
            })
            .collect();
        for item in &items {
            if !matches!(item.media_type, MediaType::Image | MediaType::Video) {
                return Err(Error::validation(
                    "children",
                    "carousel items must be images or videos",
                ));
            }
            item.validate()?;
        }
        if let Some(text) = text {
            validation::validate_text(text)?;
        }

        let mut children = Vec::with_capacity(items.len());
        for item in &items {
            let container_id = self.create_container(item).await?;
            self.ready_container(&container_id, options).await?;
            children.push(container_id);
        }

        let mut parent = MediaSpec::carousel(children);
        parent.text = text.map(str::to_string);
        self.create_and_publish(&parent, options).await
    }

    /// Waits for `container_id` and insists that it ends up `FINISHED`.
    async fn ready_container(&self, container_id: &str, options: PollOptions) -> Result<Container> {
        let container = self.wait_until_ready(container_id, options).await?;
        match container.status {
            ContainerStatus::Finished => Ok(container),
            status => Err(Error::ContainerFailed {
                id: container.id,
                status,
                detail: container.error_detail,
            }),
        }
    }

    /// Fetches a single post.
    ///
    /// # API Reference
    ///
    /// <https://developers.facebook.com/docs/threads/threads-media#retrieve-a-single-threads-media-object>
    #[instrument(skip(self))]
    pub async fn get_post(&self, post_id: &str) -> Result<Post> {
        validation::require_id("post_id", post_id)?;
        let spec = RequestSpec::get(self.path(post_id)).query("fields", POST_FIELDS);
        self.send(spec).await?.json("post")
    }

    /// Deletes a post owned by the authenticated user.
    ///
    /// # Required Scopes
    ///
    /// * `threads_basic`
    /// * `threads_delete`
    #[instrument(skip(self))]
    pub async fn delete_post(&self, post_id: &str) -> Result<()> {
        validation::require_id("post_id", post_id)?;
        let response = self.send(RequestSpec::delete(self.path(post_id))).await?;
        let deleted: DeleteResponse = response.json("delete response")?;
        if !deleted.success {
            return Err(Error::Api {
                status: Some(response.status.as_u16()),
                message: format!("post {post_id} was not deleted"),
                body: Some(String::from_utf8_lossy(&response.body).into_owned()),
                request_id: response.request_id(),
            });
        }
        tracing::debug!(post_id, "deleted post");
        Ok(())
    }

    /// Returns a [`Pager`] over a user's posts, newest first.
    ///
    /// Options are validated here; nothing is fetched until the first page is requested.
    ///
    /// # API Reference
    ///
    /// <https://developers.facebook.com/docs/threads/threads-media#retrieve-a-list-of-all-a-user-s-threads>
    pub fn list_user_posts(&self, user_id: &str, options: ListOptions) -> Result<Pager<Post>> {
        validation::require_id("user_id", user_id)?;
        options.validate(Timestamp::now())?;
        let mut spec = RequestSpec::get(self.path(&format!("{user_id}/threads")))
            .query("fields", POST_FIELDS);
        spec.query.extend(options.to_query());
        Ok(Pager::new(self.clone(), spec))
    }

    /// Returns a [`Pager`] over the direct replies to a post.
    ///
    /// # Required Scopes
    ///
    /// * `threads_read_replies`
    pub fn list_replies(&self, post_id: &str, options: ListOptions) -> Result<Pager<Post>> {
        validation::require_id("post_id", post_id)?;
        options.validate(Timestamp::now())?;
        let mut spec = RequestSpec::get(self.path(&format!("{post_id}/replies")))
            .query("fields", POST_FIELDS);
        spec.query.extend(options.to_query());
        Ok(Pager::new(self.clone(), spec))
    }

    /// Returns a [`Pager`] over public posts matching `query`.
    ///
    /// # Required Scopes
    ///
    /// * `threads_keyword_search`
    ///
    /// # API Reference
    ///
    /// <https://developers.facebook.com/docs/threads/keyword-search>
    pub fn keyword_search(
        &self,
        query: &str,
        search_type: SearchType,
        options: ListOptions,
    ) -> Result<Pager<Post>> {
        validation::require_non_blank("query", query)?;
        options.validate(Timestamp::now())?;
        let mut spec = RequestSpec::get(self.path("keyword_search"))
            .query("q", query)
            .query("search_type", search_type.as_str())
            .query("fields", POST_FIELDS);
        spec.query.extend(options.to_query());
        Ok(Pager::new(self.clone(), spec))
    }
}
