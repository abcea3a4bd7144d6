use crate::{
    error::ImportError,
    execution::{
        reader::{ReadEnd, Reader},
        summary::{ImportSummary, WorkerFailure},
        worker::Worker,
    },
};
use connectors::{
    factory::ConnectionFactory,
    file::csv::source::{CsvRowSource, RowSource},
    sql::base::connection::SqlConnection,
};
use engine_config::{Configuration, settings::validator};
use engine_core::{
    eval::{evaluator::Evaluators, functions::FunctionRegistry},
    metrics::{Instrumentation, Metrics},
    progress::ProgressReporter,
};
use engine_processing::{
    handler::{context::HandlerContext, create_handler},
    mediator::{Mediator, Router, shared_queue::SharedQueueMediator},
    partition::Partitioning,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// Number of workers, each with its own connection.
    pub threads: usize,
    /// Interval of the progress line, if wanted.
    pub progress: Option<Duration>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        ImportSettings {
            threads: 1,
            progress: None,
        }
    }
}

/// Runs imports of row sources into the configured table.
///
/// Each input gets a fresh mediator, fresh connections and fresh handlers;
/// only the configuration and the compiled evaluators are shared.
pub struct Importer {
    config: Arc<Configuration>,
    evaluators: Arc<Evaluators>,
    factory: Arc<dyn ConnectionFactory>,
    settings: ImportSettings,
    cancel: CancellationToken,
}

impl Importer {
    pub fn new(
        config: Configuration,
        registry: &FunctionRegistry,
        factory: Arc<dyn ConnectionFactory>,
        settings: ImportSettings,
        cancel: CancellationToken,
    ) -> Result<Self, ImportError> {
        validator::validate(&config)?;
        let evaluators = Evaluators::compile(&config, registry)?;

        Ok(Importer {
            config: Arc::new(config),
            evaluators: Arc::new(evaluators),
            factory,
            settings: ImportSettings {
                threads: settings.threads.max(1),
                ..settings
            },
            cancel,
        })
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Imports the files one after the other. Stops early once cancelled.
    pub async fn import_files(&self, paths: &[PathBuf]) -> Result<Vec<ImportSummary>, ImportError> {
        let mut summaries = Vec::with_capacity(paths.len());
        for path in paths {
            if self.cancel.is_cancelled() {
                warn!(input = %path.display(), "Import cancelled, remaining inputs skipped");
                break;
            }
            summaries.push(self.import_file(path).await?);
        }
        Ok(summaries)
    }

    pub async fn import_file(&self, path: &Path) -> Result<ImportSummary, ImportError> {
        let source = CsvRowSource::open(path, &self.config.csv_options)?;
        self.import(Box::new(source)).await
    }

    pub async fn import(&self, source: Box<dyn RowSource>) -> Result<ImportSummary, ImportError> {
        let run_id = Uuid::new_v4();
        let input = source.describe();
        let span = info_span!("import", %run_id, input = %input);
        self.run(run_id, input, source).instrument(span).await
    }

    async fn run(
        &self,
        run_id: Uuid,
        input: String,
        source: Box<dyn RowSource>,
    ) -> Result<ImportSummary, ImportError> {
        let started = Instant::now();
        let partitions = self.settings.threads;
        let metrics = Metrics::new();
        let instrumentation: Arc<dyn Instrumentation> = Arc::new(metrics.clone());

        let shared = Arc::new(SharedQueueMediator::for_config(
            &self.config,
            partitions,
            Arc::clone(&instrumentation),
        ));
        let router: Arc<dyn Router> = shared.clone();
        let mediator: Arc<dyn Mediator> = shared;

        info!(
            mode = %self.config.operation_mode,
            table = %self.config.target_table,
            partitions,
            batch_size = self.config.effective_batch_size(),
            routing = self.config.ignore_duplicate_pk,
            "Starting import"
        );

        let workers = self
            .prepare_workers(&mediator, &router, &instrumentation)
            .await?;

        let progress = self
            .settings
            .progress
            .map(|interval| ProgressReporter::spawn(input.clone(), metrics.clone(), interval));

        let mut tasks = JoinSet::new();
        let mut owners = HashMap::new();
        for worker in workers {
            let partition = worker.partition();
            let task = tasks.spawn(worker.run().in_current_span());
            owners.insert(task.id(), partition);
        }

        let reader = Reader::new(
            source,
            Arc::clone(&mediator),
            instrumentation,
            self.config.limit,
            self.cancel.clone(),
        );
        let (read, failures) = tokio::join!(
            reader.run(),
            collect_workers(&mut tasks, &owners, &mediator)
        );

        if let Some(progress) = progress {
            progress.stop().await;
        }
        let read = read?;

        let summary = ImportSummary {
            run_id,
            input,
            partitions,
            metrics: metrics.snapshot(),
            elapsed: started.elapsed(),
            cancelled: read.end == ReadEnd::Cancelled,
            failures,
        };
        if summary.is_complete() {
            info!(%summary, "Import finished");
        } else {
            warn!(%summary, "Import finished with problems");
        }
        Ok(summary)
    }

    /// Opens one connection and one handler per partition. Nothing is
    /// spawned unless every partition is ready.
    async fn prepare_workers(
        &self,
        mediator: &Arc<dyn Mediator>,
        router: &Arc<dyn Router>,
        instrumentation: &Arc<dyn Instrumentation>,
    ) -> Result<Vec<Worker>, ImportError> {
        let partitions = router.partitions();
        let mut opened: Vec<Arc<dyn SqlConnection>> = Vec::with_capacity(partitions);
        let mut workers = Vec::with_capacity(partitions);

        for id in 0..partitions {
            match self.prepare_worker(id, partitions, mediator, router, instrumentation, &mut opened).await {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    error!(partition = id, error = %e, "Failed to set up worker");
                    for connection in opened {
                        if let Err(e) = connection.close().await {
                            warn!(error = %e, "Failed to close connection");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(workers)
    }

    async fn prepare_worker(
        &self,
        id: usize,
        partitions: usize,
        mediator: &Arc<dyn Mediator>,
        router: &Arc<dyn Router>,
        instrumentation: &Arc<dyn Instrumentation>,
        opened: &mut Vec<Arc<dyn SqlConnection>>,
    ) -> Result<Worker, ImportError> {
        let connection = self.factory.connect().await?;
        opened.push(Arc::clone(&connection));

        let ctx = HandlerContext::new(
            Arc::clone(&self.config),
            Arc::clone(&self.evaluators),
            Arc::clone(&connection),
            Some(Arc::clone(router)),
            Partitioning::new(id, partitions),
            Arc::clone(instrumentation),
        )?;
        let handler = create_handler(Arc::new(ctx)).await?;

        Ok(Worker::new(
            id,
            Arc::clone(mediator),
            handler,
            connection,
            Arc::clone(&self.config),
            Arc::clone(&self.evaluators),
        ))
    }
}

/// Waits for every worker. A worker that died without reporting gives up
/// its partition here so the others are not left waiting for it.
async fn collect_workers(
    tasks: &mut JoinSet<Result<(), ImportError>>,
    owners: &HashMap<tokio::task::Id, usize>,
    mediator: &Arc<dyn Mediator>,
) -> Vec<WorkerFailure> {
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next_with_id().await {
        let (partition, error) = match joined {
            Ok((_, Ok(()))) => continue,
            Ok((id, Err(e))) => (owners.get(&id).copied(), e.to_string()),
            Err(e) => {
                let partition = owners.get(&e.id()).copied();
                if let Some(partition) = partition {
                    mediator.consumer_done(partition).await;
                }
                (partition, ImportError::from(e).to_string())
            }
        };
        failures.push(WorkerFailure {
            partition: partition.unwrap_or_default(),
            error,
        });
    }
    failures.sort_by_key(|f| f.partition);
    failures
}
