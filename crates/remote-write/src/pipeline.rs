// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One import run: read the file, aggregate, encode, compress and ship.
//!
//! Every stage short of configuration is fail-soft. A missing file behaves
//! like an empty one, malformed lines are skipped and a delivery failure is
//! reported in the [`RunReport`] rather than returned as an error.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::aggregator::{aggregate, LabelSchema};
use crate::compression::Compression;
use crate::config::Config;
use crate::constants::PAYLOAD_PREVIEW_BYTES;
use crate::errors::ShippingError;
use crate::importer::{import_file, ImportReport};
use crate::sample::Sample;
use crate::transport::{Payload, RemoteWriteClient, Transport};
use crate::wire::{encode_write_request, TimestampPolicy};

#[derive(Debug)]
pub enum RunOutcome {
    Exported,
    /// The file held no samples.
    NoData,
    /// No endpoint configured, nothing was sent.
    EndpointMissing,
    ExportFailed(ShippingError),
}

#[derive(Debug)]
pub struct RunReport {
    pub imported: usize,
    pub parse_failures: usize,
    /// Fields dropped by the label schema check.
    pub rejected: usize,
    pub series: usize,
    pub outcome: RunOutcome,
}

impl RunReport {
    fn empty(outcome: RunOutcome) -> Self {
        Self {
            imported: 0,
            parse_failures: 0,
            rejected: 0,
            series: 0,
            outcome,
        }
    }

    /// Process exit code: 0 unless the export itself failed.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self.outcome {
            RunOutcome::Exported | RunOutcome::NoData | RunOutcome::EndpointMissing => 0,
            RunOutcome::ExportFailed(_) => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub path: PathBuf,
    pub label_schema: LabelSchema,
    pub timestamp_policy: TimestampPolicy,
    pub compression: Compression,
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            path: config.importer.file.path.clone(),
            label_schema: config.label_schema(),
            timestamp_policy: config.timestamp_policy(),
            compression: config.compression(),
        }
    }
}

pub struct Pipeline<T> {
    config: PipelineConfig,
    transport: Option<T>,
}

impl<T: Transport> Pipeline<T> {
    /// `transport` is `None` when no endpoint is configured.
    pub fn new(config: PipelineConfig, transport: Option<T>) -> Self {
        Self { config, transport }
    }

    pub async fn run(&self) -> RunReport {
        let start = Instant::now();

        let import = match import_file(&self.config.path) {
            Ok(import) => import,
            Err(e) => {
                error!("{}", e);
                ImportReport::default()
            }
        };
        info!("Imported {} data points", import.samples.len());

        let mut report = RunReport::empty(RunOutcome::NoData);
        report.imported = import.samples.len();
        report.parse_failures = import.failures.len();
        report.outcome = self.export(&import.samples, &mut report).await;

        info!("Finished running in {:?}", start.elapsed());
        report
    }

    async fn export(&self, samples: &[Sample], report: &mut RunReport) -> RunOutcome {
        if samples.is_empty() {
            warn!("No data imported. Skipping data export.");
            return RunOutcome::NoData;
        }

        let (request, rejected) = aggregate(samples, self.config.label_schema);
        report.rejected = rejected;
        report.series = request.len();

        let Some(transport) = self.transport.as_ref() else {
            warn!("Prometheus endpoint not specified in config. Skipping data export.");
            return RunOutcome::EndpointMissing;
        };

        let encoded = encode_write_request(&request, self.config.timestamp_policy);
        drop(request);

        let body = match self.config.compression.compress(&encoded) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to prepare payload. Data dropped: {}", e);
                return RunOutcome::ExportFailed(ShippingError::Payload(e.to_string()));
            }
        };
        info!(
            "Encoded {} series into {} bytes, {} compressed",
            report.series,
            encoded.len(),
            body.len()
        );
        debug!(
            "Sample of compressed data: {:?}",
            &body[..body.len().min(PAYLOAD_PREVIEW_BYTES)]
        );

        let payload = Payload {
            body,
            content_encoding: self.config.compression.content_encoding(),
        };
        match transport.send(payload).await {
            Ok(()) => {
                info!("Data sent successfully to Prometheus");
                RunOutcome::Exported
            }
            Err(e) => {
                error!("Error sending data to Prometheus: {}", e);
                RunOutcome::ExportFailed(e)
            }
        }
    }
}

/// HTTP transport, or the reason it could not be built. Sending through an
/// unavailable transport fails without a status.
enum HttpTransport {
    Client(RemoteWriteClient),
    Unavailable(String),
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: Payload) -> Result<(), ShippingError> {
        match self {
            HttpTransport::Client(client) => client.send(payload).await,
            HttpTransport::Unavailable(reason) => {
                Err(ShippingError::Destination(None, reason.clone()))
            }
        }
    }
}

/// Runs the pipeline described by `config`, shipping over HTTP.
pub async fn run(config: &Config) -> RunReport {
    let transport = config
        .endpoint()
        .map(|endpoint| match RemoteWriteClient::new(endpoint) {
            Ok(client) => HttpTransport::Client(client),
            Err(ShippingError::Destination(_, reason) | ShippingError::Payload(reason)) => {
                HttpTransport::Unavailable(reason)
            }
        });
    run_with_transport(config, transport).await
}

/// Runs the pipeline described by `config` over `transport`. The configured
/// endpoint is ignored; `None` behaves like a missing endpoint.
pub async fn run_with_transport<T: Transport>(config: &Config, transport: Option<T>) -> RunReport {
    Pipeline::new(PipelineConfig::from(config), transport)
        .run()
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::wire::{decode_write_request, DecodedSeries, Precision, TimestampSource};
    use reqwest::StatusCode;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing_test::traced_test;

    #[derive(Default)]
    struct RecordingTransport {
        payloads: Arc<Mutex<Vec<Payload>>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn decoded(&self) -> Vec<Vec<DecodedSeries>> {
            self.payloads
                .lock()
                .unwrap()
                .iter()
                .map(|p| {
                    assert_eq!(p.content_encoding, "snappy");
                    let raw = snap::raw::Decoder::new().decompress_vec(&p.body).unwrap();
                    decode_write_request(&raw).unwrap()
                })
                .collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, payload: Payload) -> Result<(), ShippingError> {
            self.payloads.lock().unwrap().push(payload);
            if self.fail {
                Err(ShippingError::Destination(
                    Some(StatusCode::SERVICE_UNAVAILABLE),
                    "down".to_string(),
                ))
            } else {
                Ok(())
            }
        }
    }

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn pipeline_config(path: PathBuf) -> PipelineConfig {
        PipelineConfig {
            path,
            label_schema: LabelSchema::Heterogeneous,
            timestamp_policy: TimestampPolicy::default(),
            compression: Compression::Snappy,
        }
    }

    fn zstd_config(path: PathBuf) -> Config {
        use crate::config::{ExporterConfig, FileImporterConfig, ImporterConfig, PrometheusConfig};
        use crate::compression::Codec;

        Config {
            log_level: "info".to_string(),
            importer: ImporterConfig {
                file: FileImporterConfig {
                    path,
                    precision: Precision::default(),
                },
            },
            exporter: ExporterConfig {
                prometheus: PrometheusConfig {
                    compression: Codec::Zstd,
                    ..Default::default()
                },
            },
        }
    }

    fn count_warnings(lines: &[&str]) -> usize {
        lines.iter().filter(|l| l.contains("WARN")).count()
    }

    #[tokio::test]
    #[traced_test]
    async fn end_to_end_with_one_bad_line() {
        let file = write_file(
            "cpu,host=a value=1.5,other=\"x\" 1620000000000\n\
             bad line no equals\n\
             mem,host=a used=42,free=8 1620000000000\n",
        );
        let pipeline = Pipeline::new(
            pipeline_config(file.path().to_path_buf()),
            Some(RecordingTransport::default()),
        );

        let report = pipeline.run().await;

        assert!(matches!(report.outcome, RunOutcome::Exported));
        assert_eq!(report.imported, 2);
        assert_eq!(report.parse_failures, 1);
        assert_eq!(report.series, 3);
        assert_eq!(report.exit_code(), 0);

        let sent = pipeline.transport.as_ref().unwrap().decoded();
        assert_eq!(sent.len(), 1);
        let names: Vec<&str> = sent[0]
            .iter()
            .map(|s| s.label("__name__").unwrap())
            .collect();
        assert_eq!(names, vec!["cpu_value", "mem_used", "mem_free"]);
        assert!(sent[0].iter().all(|s| s.label("host") == Some("a")));

        logs_assert(|lines: &[&str]| match count_warnings(lines) {
            1 => Ok(()),
            n => Err(format!("expected 1 warning, got {n}")),
        });
    }

    #[tokio::test]
    async fn duplicate_label_sets_are_sent_once() {
        let file = write_file("cpu,host=a value=3 1\ncpu,host=a value=7 2\n");
        let pipeline = Pipeline::new(
            pipeline_config(file.path().to_path_buf()),
            Some(RecordingTransport::default()),
        );

        pipeline.run().await;

        let sent = pipeline.transport.as_ref().unwrap().decoded();
        assert_eq!(sent[0].len(), 1);
        assert_eq!(sent[0][0].value, 7.0);
    }

    #[tokio::test]
    async fn sample_timestamps_when_configured() {
        let file = write_file("cpu value=1 1620000000\n");
        let mut config = pipeline_config(file.path().to_path_buf());
        config.timestamp_policy = TimestampPolicy {
            source: TimestampSource::Sample,
            precision: Precision::Seconds,
        };
        let pipeline = Pipeline::new(config, Some(RecordingTransport::default()));

        pipeline.run().await;

        let sent = pipeline.transport.as_ref().unwrap().decoded();
        assert_eq!(sent[0][0].timestamp, 1_620_000_000_000);
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_endpoint_skips_transport() {
        let file = write_file("cpu value=1 1\n");
        let pipeline: Pipeline<RecordingTransport> =
            Pipeline::new(pipeline_config(file.path().to_path_buf()), None);

        let report = pipeline.run().await;

        assert!(matches!(report.outcome, RunOutcome::EndpointMissing));
        assert_eq!(report.series, 1);
        assert_eq!(report.exit_code(), 0);
        assert!(logs_contain(
            "Prometheus endpoint not specified in config. Skipping data export."
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_file_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            pipeline_config(dir.path().join("missing.lp")),
            Some(RecordingTransport::default()),
        );

        let report = pipeline.run().await;

        assert!(matches!(report.outcome, RunOutcome::NoData));
        assert_eq!(report.imported, 0);
        assert!(pipeline
            .transport
            .as_ref()
            .unwrap()
            .payloads
            .lock()
            .unwrap()
            .is_empty());
        assert!(logs_contain("failed to read file"));
        assert!(logs_contain("No data imported. Skipping data export."));
    }

    #[tokio::test]
    #[traced_test]
    async fn transport_failure_completes_the_run() {
        let file = write_file("cpu value=1 1\n");
        let pipeline = Pipeline::new(
            pipeline_config(file.path().to_path_buf()),
            Some(RecordingTransport::failing()),
        );

        let report = pipeline.run().await;

        assert!(matches!(
            report.outcome,
            RunOutcome::ExportFailed(ShippingError::Destination(Some(_), _))
        ));
        assert_eq!(report.exit_code(), 2);
        assert_eq!(
            pipeline.transport.as_ref().unwrap().payloads.lock().unwrap().len(),
            1
        );
        assert!(logs_contain("Error sending data to Prometheus"));
    }

    #[tokio::test]
    async fn run_with_transport_uses_config_options() {
        let file = write_file("cpu,host=a value=1 1\n");
        let config = zstd_config(file.path().to_path_buf());
        let transport = RecordingTransport::default();
        let payloads = Arc::clone(&transport.payloads);

        let report = run_with_transport(&config, Some(transport)).await;

        assert!(matches!(report.outcome, RunOutcome::Exported));
        let sent = payloads.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content_encoding, "zstd");
        let raw = zstd::decode_all(sent[0].body.as_slice()).unwrap();
        assert_eq!(decode_write_request(&raw).unwrap().len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn unavailable_client_still_imports() {
        let file = write_file("cpu value=1 1\nbad\nmem used=2 1\n");
        let pipeline = Pipeline::new(
            pipeline_config(file.path().to_path_buf()),
            Some(HttpTransport::Unavailable("no TLS backend".to_string())),
        );

        let report = pipeline.run().await;

        assert_eq!(report.imported, 2);
        assert_eq!(report.parse_failures, 1);
        assert_eq!(report.series, 2);
        assert!(matches!(
            report.outcome,
            RunOutcome::ExportFailed(ShippingError::Destination(None, ref reason))
                if reason == "no TLS backend"
        ));
        assert_eq!(report.exit_code(), 2);
        assert!(logs_contain("Error sending data to Prometheus"));
    }

    #[tokio::test]
    async fn homogeneous_schema_reports_rejections() {
        let file = write_file("cpu,host=a value=1 1\ncpu,dc=x value=2 1\n");
        let mut config = pipeline_config(file.path().to_path_buf());
        config.label_schema = LabelSchema::Homogeneous;
        let pipeline = Pipeline::new(config, Some(RecordingTransport::default()));

        let report = pipeline.run().await;

        assert_eq!(report.rejected, 1);
        assert_eq!(report.series, 1);
    }
}
