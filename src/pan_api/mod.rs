mod client;
mod download;
mod error;
mod events;
mod files;
mod share;
mod types;

pub use client::PanClient;
pub use error::ApiError;
pub use types::{
    ActivityEvent, ActivityKind, DownloadPayload, RemoteFile, SearchHit, SearchPage,
    validate_pickcode,
};
