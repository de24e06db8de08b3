//! Threads Graph API client library.
//!
//! # Publishing model
//!
//! Posts are published in two steps:
//!
//! 1. Create a media container with [`ThreadsClient::create_container`]. The server starts
//!    processing its media asynchronously.
//! 2. Once [`ThreadsClient::wait_until_ready`] reports the container as
//!    [`ContainerStatus::Finished`], publish it with [`ThreadsClient::publish`].
//!
//! [`ThreadsClient::create_and_publish`] and [`ThreadsClient::publish_carousel`] run the whole
//! sequence.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use threads_client::threads_api::{ListOptions, MediaSpec, ThreadsClient};
//! use threads_client::config::{ClientConfig, Credentials};
//! use tokio_stream::StreamExt;
//!
//! # async fn example() -> threads_client::Result<()> {
//! let client = ThreadsClient::new(Credentials::from_env()?, ClientConfig::default())?;
//! // ... log in first, see `threads_client::oauth::login` ...
//! let post = client
//!     .create_and_publish(&MediaSpec::text("hello from Rust"), client.config().poll)
//!     .await?;
//! println!("published {}", post.id);
//!
//! let me = client.user_id().await?;
//! let posts = client.list_user_posts(&me, ListOptions::default())?.into_stream();
//! let mut posts = std::pin::pin!(posts);
//! while let Some(post) = posts.next().await {
//!     println!("{:?}", post?.text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod containers;
pub mod posts;
pub mod types;
pub mod users;

pub use client::ThreadsClient;
pub use types::{Page, Pager};

pub use containers::{Container, ContainerStatus, MediaSpec, MediaType, PollOptions, ReplyControl};
pub use posts::{ListOptions, Post, PostOwner, SearchType};
pub use users::{PublishingLimit, QuotaConfig, UserProfile};
