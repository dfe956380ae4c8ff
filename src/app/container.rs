use std::sync::Arc;

use crate::adapters::{
    default_catalog, load_catalog, FfprobeAdapter, TracingLogAdapter, YtDlpAdapter,
};
use crate::app::{DownloadInteractor, FetchInteractor, ProbeInteractor};
use crate::config_initialization::Settings;
use crate::domain::model::FormatCatalog;
use crate::error::GatewayResult;
use crate::ports::{ExtractorPort, LogPort, ProbePort};

pub trait AppContainer: Send + Sync {
    fn download_interactor(&self) -> Arc<DownloadInteractor>;
    fn probe_interactor(&self) -> Arc<ProbeInteractor>;
    fn catalog(&self) -> Arc<FormatCatalog>;
}

pub struct DefaultAppContainer {
    download_interactor: Arc<DownloadInteractor>,
    probe_interactor: Arc<ProbeInteractor>,
    catalog: Arc<FormatCatalog>,
}

impl DefaultAppContainer {
    pub fn new(settings: &Settings) -> GatewayResult<Self> {
        let catalog = Arc::new(match &settings.catalog {
            Some(path) => load_catalog(path)?,
            None => default_catalog()?,
        });

        let extractor_log: Arc<dyn LogPort> = Arc::new(TracingLogAdapter::new("extractor"));
        let probe_log: Arc<dyn LogPort> = Arc::new(TracingLogAdapter::new("probe"));
        let app_log: Arc<dyn LogPort> = Arc::new(TracingLogAdapter::new("gateway"));

        let extractor_port: Arc<dyn ExtractorPort> =
            Arc::new(YtDlpAdapter::new(&settings.ytdlp).with_log(Arc::clone(&extractor_log)));
        let probe_port: Arc<dyn ProbePort> =
            Arc::new(FfprobeAdapter::new(&settings.ffprobe).with_log(Arc::clone(&probe_log)));

        let fetch_interactor = Arc::new(
            FetchInteractor::new(
                Arc::clone(&extractor_port),
                Arc::clone(&probe_port),
                Arc::clone(&app_log),
            )
            .with_probe_bytes(settings.probe_bytes),
        );

        let download_interactor = Arc::new(
            DownloadInteractor::new(
                Arc::clone(&extractor_port),
                fetch_interactor,
                Arc::clone(&app_log),
                Arc::clone(&catalog),
            )
            .with_encoder(&settings.ffmpeg, vec![]),
        );

        let probe_interactor = Arc::new(ProbeInteractor::new(
            Arc::clone(&probe_port),
            Arc::clone(&app_log),
        ));

        Ok(Self {
            download_interactor,
            probe_interactor,
            catalog,
        })
    }
}

impl AppContainer for DefaultAppContainer {
    fn download_interactor(&self) -> Arc<DownloadInteractor> {
        Arc::clone(&self.download_interactor)
    }

    fn probe_interactor(&self) -> Arc<ProbeInteractor> {
        Arc::clone(&self.probe_interactor)
    }

    fn catalog(&self) -> Arc<FormatCatalog> {
        Arc::clone(&self.catalog)
    }
}
