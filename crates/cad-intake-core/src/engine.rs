use crate::backup::BackupArchiver;
use crate::cad::{CadEngine, ScriptTemplates};
use crate::classify;
use crate::combine::{self, CombineContext};
use crate::config::{self, AppConfig, ProjectPaths};
use crate::delivery;
use crate::error::{Error, Result};
use crate::inbox;
use crate::model::{CadFile, FileKey, FileStatus, ParentFile, PlainFile, TaskType, WorkItem};
use crate::pipeline::{self, PipelineContext};
use crate::prepare::{self, PrepareContext};
use crate::preview::PreviewConverter;
use crate::progress::ProgressReporter;
use crate::report::RunReport;
use crate::storage::MetadataStore;
use chrono::{Local, NaiveDateTime};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub preview: bool,
    pub show_unknown: bool,
    pub show_ignored: bool,
}

pub struct UpdateEngine {
    config: AppConfig,
    store: Arc<dyn MetadataStore>,
    cad: Arc<dyn CadEngine>,
    options: UpdateOptions,
}

#[derive(Debug)]
pub struct UpdateResult {
    pub project: u32,
    pub items: Vec<WorkItem>,
    pub report: RunReport,
    pub report_path: Option<PathBuf>,
    pub duration: Duration,
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn build_pool(threads: usize) -> Result<ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::Other(format!("Could not start worker pool: {}", e)))
}

impl UpdateEngine {
    pub fn new(config: AppConfig, store: Arc<dyn MetadataStore>, cad: Arc<dyn CadEngine>) -> Self {
        Self {
            config,
            store,
            cad,
            options: UpdateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    /// Run one update batch for a project:
    /// 1. Resolve project folders and classify the download folder
    /// 2. Prepare CAD files and plan inbox folders (sequential)
    /// 3. Run every file pipeline in a bounded pool
    /// 4. Combine parents in a second pool once all pipelines are done
    /// 5. Stamp, preview, copy non-CAD files, report
    ///
    /// Only configuration problems found before per-file work begins are returned as errors.
    pub fn run(&self, project: &str, reporter: &dyn ProgressReporter) -> Result<UpdateResult> {
        let start = Instant::now();

        let number = config::parse_project_number(project)?;
        info!("Project number: {:06}", number);

        let paths = ProjectPaths::locate(&self.config.projects_dir, number)?;
        let record = self
            .store
            .project(number)?
            .ok_or(Error::ProjectNotFound(number))?;
        let download = config::download_folder(&self.config.download_root, number, &record.name)?;

        info!("Checking downloaded files...");
        let incoming = classify::list_incoming(&download, &self.config.ignore_patterns)?;
        let records = self.store.file_records(number)?;
        let trades = self.store.trades(number)?;
        let items = classify::classify_all(incoming, &records, &trades);

        let mut to_process: Vec<CadFile> = Vec::new();
        let mut to_copy: Vec<PlainFile> = Vec::new();
        let mut rest: Vec<WorkItem> = Vec::new();
        for item in items {
            match item {
                WorkItem::Cad(file) if file.task == TaskType::ProcessCad => to_process.push(file),
                WorkItem::Plain(file) if file.task == TaskType::Copy => to_copy.push(file),
                other => rest.push(other),
            }
        }

        let count = |task: TaskType| rest.iter().filter(|i| i.task() == task).count();
        info!(
            "{} files to update: {}",
            to_process.len(),
            to_process
                .iter()
                .map(|f| f.incoming.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        info!(
            "{} files to copy over: {}",
            to_copy.len(),
            to_copy
                .iter()
                .map(|f| f.incoming.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        reporter.on_classified(
            to_process.len(),
            to_copy.len(),
            count(TaskType::Ignore),
            count(TaskType::Unknown),
        );

        let mut parents: Vec<ParentFile> = Vec::new();

        if to_process.is_empty() && to_copy.is_empty() {
            info!("No actions to take. Ending process");
        } else {
            if !to_process.is_empty() {
                self.prepare_all(number, &paths, &mut to_process, reporter);
                self.execute_all(number, &mut to_process, reporter)?;
                parents = self.combine_all(number, &to_process, reporter)?;

                let completed = Local::now().naive_local();
                let processed: Vec<PathBuf> = to_process
                    .iter()
                    .filter_map(|f| f.outcome.merged_path.clone())
                    .chain(
                        parents
                            .iter()
                            .filter(|p| p.execute_successful)
                            .map(|p| p.processed_path.clone()),
                    )
                    .collect();
                self.stamp_processed(number, &processed, completed);

                if self.options.preview {
                    self.preview_all(&processed)?;
                }
            }

            if !to_copy.is_empty() {
                self.copy_all(number, &paths, &mut to_copy, reporter);
            }
        }

        let mut all: Vec<WorkItem> = rest;
        all.extend(to_process.into_iter().map(WorkItem::Cad));
        all.extend(parents.into_iter().map(WorkItem::Parent));
        all.extend(to_copy.into_iter().map(WorkItem::Plain));

        let report = RunReport::from_items(&all);
        report.log(self.options.show_unknown, self.options.show_ignored);

        let report_path = self.config.report_dir.join(format!(
            "{:06}_{}.csv",
            number,
            inbox::batch_timestamp(Local::now().naive_local())
        ));
        let report_path = match report.write_csv(&report_path) {
            Ok(()) => Some(report_path),
            Err(e) => {
                error!("Could not write report {}: {}", report_path.display(), e);
                None
            }
        };

        info!("Process complete!");

        Ok(UpdateResult {
            project: number,
            items: all,
            report,
            report_path,
            duration: start.elapsed(),
        })
    }

    fn set_status(&self, project: u32, key: &FileKey, status: FileStatus) {
        match self.store.set_status(project, key, status) {
            Ok(0) => debug!("No file row for {:?}", key),
            Ok(_) => debug!("{:?} -> {}", key, status.as_str()),
            Err(e) => error!("Could not set status of {:?}: {}", key, e),
        }
    }

    fn prepare_all(
        &self,
        project: u32,
        paths: &ProjectPaths,
        files: &mut [CadFile],
        reporter: &dyn ProgressReporter,
    ) {
        info!("Preparing files");
        reporter.on_prepare_start(files.len());

        let ctx = PrepareContext {
            store: self.store.as_ref(),
            project,
            merge_root: &paths.merge_root,
            scripts_dir: &self.config.scripts_dir,
        };

        for file in files.iter_mut() {
            self.set_status(project, &FileKey::External(file.incoming.base_name()), FileStatus::Processing);
            prepare::prepare_file(&ctx, file);
            reporter.on_prepared(&file.incoming.name, file.prepare_successful());
        }

        let timestamp = inbox::batch_timestamp(Local::now().naive_local());
        inbox::assign_inbox_folders(files, &paths.inbox, &timestamp);
    }

    fn execute_all(&self, project: u32, files: &mut [CadFile], reporter: &dyn ProgressReporter) -> Result<()> {
        info!("Processing files.");
        let started = Instant::now();
        let prepared = files.iter().filter(|f| f.prepare_successful()).count();
        reporter.on_execute_start(prepared);

        let templates = ScriptTemplates::new(&self.config.scripts_dir, &self.config.reftag_dir);
        let archiver = BackupArchiver::new();
        let ctx = PipelineContext {
            engine: self.cad.as_ref(),
            templates: &templates,
            archiver: &archiver,
        };

        let pool = build_pool(self.config.max_workers)?;
        pool.install(|| {
            files
                .par_iter_mut()
                .filter(|f| f.prepare_successful())
                .for_each(|file| {
                    pipeline::execute(&ctx, file);
                    reporter.on_file_complete(&file.incoming.name, file.execute_successful());
                })
        });

        let mut succeeded = 0;
        for file in files.iter() {
            let status = if file.execute_successful() {
                succeeded += 1;
                FileStatus::Ready
            } else {
                FileStatus::Failed
            };
            self.set_status(project, &FileKey::External(file.incoming.base_name()), status);
        }

        for (archive, names) in archiver.entries() {
            debug!("{} entries added to {}", names.len(), archive.display());
        }

        reporter.on_execute_complete(
            succeeded,
            files.len() - succeeded,
            started.elapsed().as_secs_f64(),
        );
        Ok(())
    }

    fn combine_all(
        &self,
        project: u32,
        files: &[CadFile],
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<ParentFile>> {
        let mut parents = combine::plan_parents(self.store.as_ref(), project, files);
        if parents.is_empty() {
            return Ok(parents);
        }

        info!("Creating parent files.");
        reporter.on_combine_start(parents.len());
        for parent in &parents {
            self.set_status(project, &FileKey::Internal(parent.base_name.clone()), FileStatus::Processing);
        }

        let templates = ScriptTemplates::new(&self.config.scripts_dir, &self.config.reftag_dir);
        let ctx = CombineContext {
            engine: self.cad.as_ref(),
            templates: &templates,
        };

        let pool = build_pool(self.config.max_parent_workers)?;
        pool.install(|| {
            parents.par_iter_mut().for_each(|parent| {
                combine::combine_parent(&ctx, parent);
                reporter.on_parent_complete(&parent.base_name, parent.execute_successful);
            })
        });

        for parent in &parents {
            let status = if parent.execute_successful {
                FileStatus::Ready
            } else {
                FileStatus::Failed
            };
            self.set_status(project, &FileKey::Internal(parent.base_name.clone()), status);
        }
        Ok(parents)
    }

    fn stamp_processed(&self, project: u32, processed: &[PathBuf], at: NaiveDateTime) {
        if processed.is_empty() {
            return;
        }
        info!("Updating database timestamps");
        for path in processed {
            let key = FileKey::Internal(stem(path));
            if let Err(e) = self.store.stamp_last_processed(project, &key, at) {
                error!("Could not update timestamp of {}: {}", path.display(), e);
            }
        }
    }

    fn preview_all(&self, processed: &[PathBuf]) -> Result<()> {
        let converter = match &self.config.preview_converter_path {
            Some(path) => PreviewConverter::new(path),
            None => {
                warn!("No preview converter configured, skipping previews");
                return Ok(());
            }
        };

        info!("Creating previews");
        let pool = build_pool(self.config.max_workers)?;
        pool.install(|| {
            processed.par_iter().for_each(|drawing| {
                converter.preview(drawing);
            })
        });
        Ok(())
    }

    fn copy_all(
        &self,
        project: u32,
        paths: &ProjectPaths,
        files: &mut [PlainFile],
        reporter: &dyn ProgressReporter,
    ) {
        info!("Copying over files");
        let misc = paths.misc_dir();

        for file in files.iter_mut() {
            delivery::deliver_copy(file, &misc);
            let status = if file.copy_successful {
                FileStatus::Ready
            } else {
                FileStatus::Failed
            };
            self.set_status(project, &FileKey::External(file.incoming.base_name()), status);
        }

        let completed = Local::now().naive_local();
        let copied: Vec<&PlainFile> = files.iter().filter(|f| f.copy_successful).collect();
        if !copied.is_empty() {
            info!("Updating copied files timestamps");
        }
        for file in &copied {
            let key = FileKey::External(file.incoming.base_name());
            if let Err(e) = self.store.stamp_last_processed(project, &key, completed) {
                error!("Could not update timestamp of {}: {}", file.incoming.name, e);
            }
        }

        reporter.on_copy_complete(copied.len(), files.len() - copied.len());
    }
}
