//! Command dispatch.
//!
//! Loads configuration, opens the index, and runs one subcommand. Fatal
//! problems come back as `anyhow` errors; everything else is folded into
//! the returned [`ExitCode`].

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytesize::ByteSize;

use crate::cli::{Cli, Commands, DeleteArgs, ExportArgs, FindArgs, ReportArgs, ScanArgs};
use crate::config::Config;
use crate::context::IndexContext;
use crate::duplicates::{
    render_report, write_report, DuplicateGroup, DuplicateResolver, ResolverConfig,
};
use crate::error::ExitCode;
use crate::logging::init_logging;
use crate::output::{write_index_log, write_index_logs};
use crate::pool::PoolConfig;
use crate::progress::{phase_spinner, ScanProgress};
use crate::reclaim::Reclaimer;
use crate::scanner::{validate_root, ExcludeMatcher, Hasher, ScanConfig, Scanner};
use crate::signal::{install_handler, CancelToken};
use crate::store::MetadataStore;

/// Default name of the duplicate report, written in the scanned root.
pub const REPORT_FILE_NAME: &str = "fav.log.dup";

/// Run the parsed command line.
///
/// # Errors
///
/// Fatal errors only: bad configuration, unreachable store, missing root,
/// or a pool that cannot start.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.quiet);
    let config = Config::load(cli.config.as_deref(), &cli.overrides())?;
    log::debug!("Effective configuration: {config:?}");

    if matches!(cli.command, Commands::Config) {
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::Success);
    }

    let cancel = match install_handler() {
        Ok(token) => token,
        Err(e) => {
            log::warn!("{e}; Ctrl+C will not stop the run cleanly");
            CancelToken::new()
        }
    };

    let db_path = config.resolved_db_path();
    let store = MetadataStore::open(config.store, &db_path)
        .with_context(|| format!("Cannot open {} index at {}", config.store, db_path.display()))?;
    let ctx = IndexContext::new(store, cancel)
        .with_hasher(Hasher::new().with_mmap(config.use_mmap))
        .with_max_open_files(config.max_open_files);

    let app = App {
        ctx,
        config,
        quiet: cli.quiet,
        accessible: cli.accessible,
    };
    match &cli.command {
        Commands::Scan(args) => app.scan(args),
        Commands::Find(args) => app.find(args),
        Commands::Report(args) => app.report(args),
        Commands::Delete(args) => app.delete(args),
        Commands::Reclaim => app.reclaim(),
        Commands::Export(args) => app.export(args),
        Commands::Config => Ok(ExitCode::Success),
    }
}

struct App {
    ctx: IndexContext,
    config: Config,
    quiet: bool,
    accessible: bool,
}

impl App {
    fn pool(&self) -> PoolConfig {
        let pool = PoolConfig::with_workers(self.config.workers);
        match self.config.queue_capacity {
            Some(capacity) => pool.with_queue_capacity(capacity),
            None => pool,
        }
    }

    fn say(&self, line: &str) {
        if !self.quiet {
            println!("{line}");
        }
    }

    fn resolver(&self, root: PathBuf) -> DuplicateResolver {
        DuplicateResolver::new(
            self.ctx.clone(),
            ResolverConfig::new(root)
                .with_pool(self.pool())
                .with_max_groups(self.config.max_groups),
        )
    }

    fn exclude_matcher(&self, patterns: &[String]) -> Result<ExcludeMatcher> {
        let from_file = match &self.config.exclude_file {
            Some(path) => ExcludeMatcher::from_file(path).unwrap_or_else(|e| {
                log::warn!("{e}; continuing without its patterns");
                ExcludeMatcher::empty()
            }),
            None => ExcludeMatcher::empty(),
        };
        let from_cli = ExcludeMatcher::from_patterns(patterns)?;
        Ok(from_file.merge(from_cli))
    }

    fn scan(&self, args: &ScanArgs) -> Result<ExitCode> {
        let mut errors = 0;
        if self.config.reclaim_on_scan {
            let summary = Reclaimer::new(self.ctx.clone(), self.pool()).reclaim()?;
            errors += summary.errors;
        }
        if self.ctx.cancel.is_cancelled() {
            return Ok(ExitCode::Interrupted);
        }

        let scan_config = ScanConfig::new(args.path.clone())
            .with_min_size(self.config.min_size)
            .with_hashes(!args.no_hash)
            .with_exclude(self.exclude_matcher(&args.exclude)?)
            .with_pool(self.pool().named("index"));
        let scanner = Scanner::new(self.ctx.clone(), scan_config);
        let progress = ScanProgress::start(scanner.counters(), self.quiet, self.accessible);
        let summary = scanner.run()?;
        progress.finish(&summary.counts);
        errors += summary.counts.errors;

        self.say(&format!(
            "Indexed {} files ({} hashed, {} unchanged) in {:.1?}",
            summary.counts.indexed,
            summary.counts.hashed,
            summary.counts.already_indexed,
            summary.elapsed
        ));

        if !args.no_log && !summary.interrupted {
            let dir = args.log_dir.clone().unwrap_or_else(|| summary.root.clone());
            match write_index_logs(&dir, &self.ctx.store, &summary.root) {
                Ok(files) => {
                    for file in files {
                        log::debug!("Index log: {}", file.display());
                    }
                }
                Err(e) => {
                    log::warn!("Failed to write index logs to {}: {e}", dir.display());
                    errors += 1;
                }
            }
        }
        Ok(ExitCode::from_error_count(errors, summary.interrupted))
    }

    fn find(&self, args: &FindArgs) -> Result<ExitCode> {
        let root = validate_root(&args.path)?;
        let resolver = self.resolver(root);
        let spinner = phase_spinner("Resolving duplicate groups", self.quiet, self.accessible);
        let summary = resolver.find_duplicates()?;
        spinner.finish_and_clear();

        self.say(&format!(
            "{} duplicate groups from {} candidate sets ({} files checked, {} hashed)",
            summary.groups, summary.candidate_sets, summary.files_checked, summary.hashed
        ));
        if summary.limit_reached {
            self.say(&format!(
                "Stopped at the limit of {} groups",
                resolver.config().max_groups
            ));
        }

        if summary.interrupted {
            Ok(ExitCode::Interrupted)
        } else if summary.groups == 0 && summary.errors == 0 {
            Ok(ExitCode::NoDuplicates)
        } else {
            Ok(ExitCode::from_error_count(summary.errors, false))
        }
    }

    fn report(&self, args: &ReportArgs) -> Result<ExitCode> {
        let root = validate_root(&args.path)?;
        let groups = self.resolver(root.clone()).groups()?;
        if groups.is_empty() {
            self.say("No duplicate groups in the index");
            return Ok(ExitCode::NoDuplicates);
        }

        if args.stdout {
            let mut out = io::stdout().lock();
            for line in render_report(&self.ctx.store, &root, &groups)? {
                writeln!(out, "{line}")?;
            }
        } else {
            let path = args
                .output
                .clone()
                .unwrap_or_else(|| root.join(REPORT_FILE_NAME));
            let written = write_report(&path, &self.ctx.store, &root, &groups)?;
            self.say(&format!("Wrote {written} groups to {}", path.display()));
        }
        Ok(ExitCode::Success)
    }

    fn delete(&self, args: &DeleteArgs) -> Result<ExitCode> {
        let root = validate_root(&args.path)?;
        let resolver = self.resolver(root.clone());
        let groups: Vec<DuplicateGroup> = resolver
            .groups()?
            .into_iter()
            .filter(|g| within(&root, g))
            .collect();
        if groups.is_empty() {
            self.say("No duplicate groups under this root");
            return Ok(ExitCode::NoDuplicates);
        }

        if args.dry_run {
            for line in render_report(&self.ctx.store, &root, &groups)? {
                println!("{line}");
            }
            return Ok(ExitCode::Success);
        }
        if !args.yes {
            anyhow::bail!(
                "Refusing to delete {} duplicate groups without --yes (use --dry-run to preview)",
                groups.len()
            );
        }

        let summary = resolver.delete_duplicates(&groups, self.config.delete_mode);
        self.say(&format!(
            "Deleted {} files, freed {} ({} groups, {} skipped, {} errors)",
            summary.files_deleted,
            ByteSize::b(summary.bytes_freed),
            summary.groups_processed,
            summary.groups_skipped,
            summary.errors
        ));
        Ok(ExitCode::from_error_count(summary.errors, summary.interrupted))
    }

    fn reclaim(&self) -> Result<ExitCode> {
        let spinner = phase_spinner("Reclaiming stale entries", self.quiet, self.accessible);
        let summary = Reclaimer::new(self.ctx.clone(), self.pool()).reclaim()?;
        spinner.finish_and_clear();
        self.say(&format!(
            "Checked {} paths: {} missing and {} incomplete entries removed",
            summary.checked, summary.purged_missing, summary.purged_incomplete
        ));
        Ok(ExitCode::from_error_count(summary.errors, summary.interrupted))
    }

    fn export(&self, args: &ExportArgs) -> Result<ExitCode> {
        let root = validate_root(&args.path)?;
        let records = self.ctx.store.records()?;
        let lines = match &args.output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Cannot create {}", path.display()))?;
                write_index_log(BufWriter::new(file), &root, &records, args.order)?
            }
            None => write_index_log(io::stdout().lock(), &root, &records, args.order)?,
        };
        log::info!("Exported {lines} entries");
        Ok(ExitCode::Success)
    }
}

fn within(root: &Path, group: &DuplicateGroup) -> bool {
    group.paths().all(|p| Path::new(p).starts_with(root))
}
