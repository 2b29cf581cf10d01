// src/ingest/mod.rs
//! Incremental ingestion: work out which dates a dataset is missing, fetch
//! them, parse what came back and merge it in one atomic write.

pub mod report;

pub use report::{DateFailure, FailureKind, RunReport, SourceStatus};

use chrono::{Local, NaiveDate};
use futures::{stream, StreamExt};
use std::{collections::BTreeSet, io, path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    cache::ArtifactCache,
    calendar::BusinessCalendar,
    config::Config,
    dataset::{DatasetError, DatasetStore},
    fetch::{FetchError, Fetcher},
    process::{decode_text, first_line},
    schema::ReferenceRecord,
    sources::{FetchPlan, SourceAdapter, Validity},
};

/// Errors that end a source run. Per-date problems never get here; they
/// are collected in the [`RunReport`].
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("artifact cache {}: {source}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Re-fetch this many business days up to today regardless of what
    /// the dataset already holds.
    pub force_days: Option<usize>,
}

impl RunOptions {
    pub fn forced(days: usize) -> Self {
        Self {
            force_days: Some(days),
        }
    }
}

/// Outcome of one source inside [`Ingestor::run_many`].
#[derive(Debug)]
pub struct SourceOutcome {
    pub source: String,
    pub result: Result<RunReport, IngestError>,
}

impl SourceOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(r) if r.succeeded())
    }
}

struct Artifact {
    path: PathBuf,
    bytes: Vec<u8>,
}

enum Miss {
    Fetch(FetchError),
    /// The artifact could not be read from or written to the cache.
    Cache(PathBuf, io::Error),
}

struct Download {
    date: NaiveDate,
    outcome: Result<Artifact, Miss>,
}

pub struct Ingestor {
    config: Arc<Config>,
    calendar: Arc<BusinessCalendar>,
    fetcher: Arc<dyn Fetcher>,
    today: Option<NaiveDate>,
}

impl Ingestor {
    pub fn new(config: Arc<Config>, calendar: Arc<BusinessCalendar>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            calendar,
            fetcher,
            today: None,
        }
    }

    /// Pin "today" instead of reading the local clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn store_for(&self, adapter: &dyn SourceAdapter) -> DatasetStore {
        DatasetStore::new(
            self.config.bases_dir().join(adapter.dataset_file()),
            adapter.schema(),
        )
    }

    pub fn cache_for(&self, adapter: &dyn SourceAdapter) -> Result<ArtifactCache, IngestError> {
        let root = self.config.downloads_dir();
        ArtifactCache::new(
            &root,
            adapter.name(),
            adapter.artifact_extension(),
            self.config.archive_dir.as_deref(),
        )
        .map_err(|source| IngestError::Cache { path: root, source })
    }

    /// Dates to request for a dataset whose greatest stored date is `last`.
    pub fn plan(&self, adapter: &dyn SourceAdapter, last: Option<NaiveDate>, options: RunOptions) -> Vec<NaiveDate> {
        let today = self.today();
        match (adapter.fetch_plan(), options.force_days) {
            (FetchPlan::Snapshot, Some(_)) => vec![today],
            (FetchPlan::Snapshot, None) => match last {
                Some(l) if l >= today => Vec::new(),
                _ => vec![today],
            },
            (FetchPlan::PerBusinessDay, Some(n)) => self.calendar.last_n_business_days(n, today),
            (FetchPlan::PerBusinessDay, None) => {
                let start = match last {
                    Some(l) => self.calendar.next_business_day(l),
                    None => adapter.fallback_epoch(),
                };
                if start > today {
                    Vec::new()
                } else {
                    self.calendar.business_days_in_range(start, today)
                }
            }
        }
    }

    /// Bring one dataset up to date.
    ///
    /// Holds the dataset lock for the whole run. Nothing is merged when
    /// `cancel` fires; downloads already cached are kept for the next run.
    #[instrument(skip_all, fields(source = adapter.name()))]
    pub async fn run(
        &self,
        adapter: &dyn SourceAdapter,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport, IngestError> {
        let store = self.store_for(adapter);
        let _lock = store.lock()?;
        let cache = self.cache_for(adapter)?;
        let last = store.last_date()?;

        let mut report = RunReport::new(adapter.name());
        report.last_date_before = last;

        // leftovers of an interrupted run are merged along with the plan
        let dates: BTreeSet<NaiveDate> = self
            .plan(adapter, last, options)
            .into_iter()
            .chain(cache.pending())
            .collect();
        if dates.is_empty() {
            info!(last = ?last, "dataset is current");
            return Ok(report);
        }
        let dates: Vec<NaiveDate> = dates.into_iter().collect();
        report.dates_attempted = dates.len();
        info!(
            dates = dates.len(),
            from = %dates[0],
            to = %dates[dates.len() - 1],
            forced = options.force_days.is_some(),
            "fetching"
        );

        let downloads = match self.download_all(adapter, &cache, &dates, cancel).await {
            Some(d) => d,
            None => {
                warn!("cancelled; nothing merged");
                report.cancelled = true;
                return Ok(report);
            }
        };

        let mut batch: Vec<ReferenceRecord> = Vec::new();
        let mut consumed: Vec<PathBuf> = Vec::new();
        for Download { date, outcome } in downloads {
            let artifact = match outcome {
                Ok(a) => a,
                Err(Miss::Fetch(FetchError::NotFound { url })) => {
                    debug!(%date, %url, "not published");
                    report.dates_empty += 1;
                    continue;
                }
                Err(Miss::Fetch(e)) => {
                    error!(%date, error = %e, "fetch failed");
                    report.fail(date, FailureKind::Transport, e.to_string());
                    continue;
                }
                Err(Miss::Cache(path, e)) => {
                    error!(%date, path = %path.display(), error = %e, "artifact cache I/O failed");
                    report.fail(date, FailureKind::Cache, format!("{}: {}", path.display(), e));
                    continue;
                }
            };

            let validity = adapter.classify(&artifact.bytes);
            if validity != Validity::WellFormed {
                debug!(%date, ?validity, "no data");
                cache.discard(&artifact.path);
                report.dates_empty += 1;
                continue;
            }

            let records = match adapter.parse(&artifact.bytes, date) {
                Ok(r) => r,
                Err(e) => {
                    let text = decode_text(&artifact.bytes, adapter.encoding());
                    warn!(%date, first_line = first_line(&text), error = %e, "parse failed");
                    match cache.quarantine(&artifact.path) {
                        Ok(to) => debug!(path = %to.display(), "artifact quarantined"),
                        Err(qe) => warn!(path = %artifact.path.display(), error = %qe, "could not quarantine artifact"),
                    }
                    report.fail(date, FailureKind::Parse, e.to_string());
                    continue;
                }
            };

            report.records_parsed += records.len();
            if records.is_empty() {
                report.dates_empty += 1;
            } else {
                report.dates_succeeded += 1;
            }
            for rec in records {
                if self.accepts(&rec, last, options) {
                    batch.push(rec);
                } else {
                    report.records_stale += 1;
                }
            }
            consumed.push(artifact.path);
        }

        if !batch.is_empty() {
            let outcome = store.append(&batch)?;
            report.records_appended = outcome.appended;
            report.duplicates_dropped = outcome.duplicates;
        } else {
            debug!("nothing new to merge");
        }
        if let Err(e) = cache.release(&consumed) {
            warn!(error = %e, "merged artifacts could not be released");
        }

        info!(
            appended = report.records_appended,
            duplicates = report.duplicates_dropped,
            empty = report.dates_empty,
            failed = report.failures.len(),
            "done"
        );
        Ok(report)
    }

    fn accepts(&self, rec: &ReferenceRecord, last: Option<NaiveDate>, options: RunOptions) -> bool {
        if !self.calendar.is_business_day(rec.reference_date) {
            warn!(date = %rec.reference_date, "record dated on a non-business day dropped");
            return false;
        }
        match (options.force_days, last) {
            (None, Some(l)) => rec.reference_date > l,
            _ => true,
        }
    }

    /// Every planned date, from the cache or the network. `None` when
    /// cancelled before all fetches completed.
    async fn download_all(
        &self,
        adapter: &dyn SourceAdapter,
        cache: &ArtifactCache,
        dates: &[NaiveDate],
        cancel: &CancellationToken,
    ) -> Option<Vec<Download>> {
        let fetches = stream::iter(dates.iter().copied())
            .map(|date| async move {
                Download {
                    date,
                    outcome: self.download_one(adapter, cache, date).await,
                }
            })
            .buffer_unordered(self.config.http.concurrency())
            .collect::<Vec<_>>();

        let mut downloads = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            done = fetches => done,
        };
        downloads.sort_by_key(|d| d.date);
        Some(downloads)
    }

    async fn download_one(
        &self,
        adapter: &dyn SourceAdapter,
        cache: &ArtifactCache,
        date: NaiveDate,
    ) -> Result<Artifact, Miss> {
        let path = cache.path_for(date);
        match cache.load(date) {
            Ok(Some(bytes)) => {
                debug!(%date, "using cached artifact");
                return Ok(Artifact { path, bytes });
            }
            Ok(None) => {}
            Err(e) => return Err(Miss::Cache(path, e)),
        }

        let request = adapter.build_request(date);
        debug!(%date, %request, "requesting");
        let resp = self.fetcher.fetch(&request).await.map_err(Miss::Fetch)?;
        match cache.store(date, &resp.bytes).await {
            Ok(path) => Ok(Artifact {
                path,
                bytes: resp.bytes,
            }),
            Err(e) => Err(Miss::Cache(path, e)),
        }
    }

    /// Run `adapters` one after another. A source that fails does not stop
    /// the ones after it; cancellation does.
    pub async fn run_many(
        &self,
        adapters: &[Box<dyn SourceAdapter>],
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Vec<SourceOutcome> {
        let mut outcomes = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let result = if cancel.is_cancelled() {
                let mut report = RunReport::new(adapter.name());
                report.cancelled = true;
                Ok(report)
            } else {
                self.run(adapter.as_ref(), options, cancel).await
            };
            if let Err(e) = &result {
                error!(source = adapter.name(), error = %e, "run failed");
            }
            outcomes.push(SourceOutcome {
                source: adapter.name().to_string(),
                result,
            });
        }
        outcomes
    }

    /// Last stored date and cache state of each dataset. Does not lock.
    pub fn status(&self, adapters: &[Box<dyn SourceAdapter>]) -> Vec<SourceStatus> {
        adapters
            .iter()
            .map(|adapter| {
                let store = self.store_for(adapter.as_ref());
                let mut status = SourceStatus {
                    source: adapter.name().to_string(),
                    dataset: store.path().to_path_buf(),
                    last_date: None,
                    rows: 0,
                    pending: 0,
                    rejected: 0,
                    error: None,
                };
                match store.read_rows() {
                    Ok(rows) => {
                        status.rows = rows.len();
                        status.last_date = rows.iter().map(|r| r.reference_date).max();
                    }
                    Err(e) => status.error = Some(e.to_string()),
                }
                if let Ok(cache) = self.cache_for(adapter.as_ref()) {
                    status.pending = cache.pending().len();
                    status.rejected = cache.rejected().len();
                }
                status
            })
            .collect()
    }
}
