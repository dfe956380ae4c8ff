// Application layer - Use case interactors

pub mod container;
pub mod download_interactor;
pub mod fetch_interactor;
pub mod probe_interactor;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export interactors
pub use download_interactor::{DownloadInteractor, DownloadOptions, DownloadResult};
pub use fetch_interactor::FetchInteractor;
pub use probe_interactor::ProbeInteractor;
