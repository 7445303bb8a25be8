//! taskflow CLI
//!
//! Loads the configuration tiers and the workflow, opens the database and
//! runs one engine operation. Results and failures are printed as JSON.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use taskflow::cancel::CancelToken;
use taskflow::cli::{
    Cli, Command, CompleteArgs, CreateArgs, DepsArgs, HistoryArgs, LinkArgs, PinArgs,
    TransitionArgs, UnlinkArgs, ValidateArgs,
};
use taskflow::config::{Config, ConfigLoader, WorkflowConfig, WorkflowSource};
use taskflow::db::Database;
use taskflow::error::{EngineError, ErrorResponse};
use taskflow::logging::init_logging;
use taskflow::store::WorkStore;
use taskflow::types::NewWorkItem;
use taskflow::workflow::{
    DependencyTreeBuilder, HistoryQuery, NextWorkSelector, RelationshipGraph, TransitionEngine,
    TransitionRequest, ValidationMode, WorkflowHandle, validate,
};
use tracing::{debug, info};

/// Everything a command needs once the workflow is known to be valid.
struct Context {
    config: Config,
    store: Arc<dyn WorkStore>,
    workflow: WorkflowHandle,
    cancel: CancelToken,
}

impl Context {
    fn engine(&self) -> TransitionEngine {
        TransitionEngine::new(Arc::clone(&self.store), self.workflow.clone())
    }

    fn relationships(&self) -> RelationshipGraph {
        RelationshipGraph::new(Arc::clone(&self.store))
    }
}

fn main() {
    let code = match run() {
        Ok(()) => 0,
        Err(err) => {
            let response = ErrorResponse::from(&err);
            tracing::error!(code = ?response.code, "{}", response.message);
            let _ = print_json(&response);
            1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // SAFETY: single-threaded at this point, before any other work starts
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var("TASKFLOW_CONFIG_PATH", config_path);
        }
    }
    let mut loader = ConfigLoader::load()?;

    init_logging(
        &cli.log,
        cli.verbose,
        loader.config().logging.level.as_deref(),
    )?;
    if let Some(path) = loader.config_path() {
        debug!(path = %path.display(), "Using config file");
    }

    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.store.db_path = db_path.into();
    }
    if let Some(workflow_path) = &cli.workflow {
        config.workflow.path = Some(workflow_path.into());
    }

    let (workflow_config, source) = loader.load_workflow()?;
    info!(source = %source, "Loaded workflow");
    let config = loader.into_config();

    let cancel = match cli.timeout_ms {
        Some(ms) => CancelToken::with_timeout(Duration::from_millis(ms)),
        None => CancelToken::new(),
    };

    if let Command::Validate(args) = &cli.command {
        return run_validate(&config, workflow_config, &source, args);
    }

    let mode = validation_mode(&config, false);
    let (workflow, _report) = WorkflowHandle::from_config(workflow_config, mode)?;
    let db = Database::open(&config.store.db_path)?;
    info!(path = %config.store.db_path.display(), "Database opened");

    let ctx = Context {
        config,
        store: Arc::new(db),
        workflow,
        cancel,
    };

    match cli.command {
        Command::Validate(_) => Ok(()),
        Command::Create(args) => run_create(&ctx, args),
        Command::Transition(args) => run_transition(&ctx, args),
        Command::History(args) => run_history(&ctx, args),
        Command::Link(args) => run_link(&ctx, args),
        Command::Unlink(args) => run_unlink(&ctx, args),
        Command::Deps(args) => run_deps(&ctx, args),
        Command::Next => run_next(&ctx),
        Command::Complete(args) => run_complete(&ctx, args),
        Command::Pin(args) => run_pin(&ctx, args),
    }
}

fn validation_mode(config: &Config, strict_flag: bool) -> ValidationMode {
    if strict_flag || config.workflow.strict {
        ValidationMode::Strict
    } else {
        ValidationMode::Normal
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_validate(
    config: &Config,
    workflow: WorkflowConfig,
    source: &WorkflowSource,
    args: &ValidateArgs,
) -> Result<()> {
    let mode = validation_mode(config, args.strict);
    let report = validate(&workflow, mode);
    print_json(&json!({
        "source": source.to_string(),
        "strict": mode == ValidationMode::Strict,
        "valid": report.is_valid(),
        "violations": report.violations,
    }))?;
    if report.is_valid() {
        Ok(())
    } else {
        Err(EngineError::Configuration(report).into())
    }
}

fn run_create(ctx: &Context, args: CreateArgs) -> Result<()> {
    let mut item = NewWorkItem::new(args.key, args.kind.into(), args.status.unwrap_or_default())
        .execution_order(args.order);
    if let Some(title) = args.title {
        item = item.title(title);
    }
    if let Some(priority) = args.priority {
        item = item.priority(priority);
    }
    if let Some(parent) = args.parent {
        item = item.parent(parent);
    }
    item = item.status_override(args.status_override);
    let created = ctx.engine().create_item(item, &ctx.cancel)?;
    print_json(&created)
}

fn run_transition(ctx: &Context, args: TransitionArgs) -> Result<()> {
    let mut request = TransitionRequest::new(args.key, args.status).force(args.force);
    request.agent = args.agent;
    request.notes = args.notes;
    request.reason = args.reason;
    request.reason_doc = args.reason_doc;
    let outcome = ctx.engine().transition(&request, &ctx.cancel)?;
    print_json(&outcome)
}

fn run_history(ctx: &Context, args: HistoryArgs) -> Result<()> {
    let engine = ctx.engine();
    let entries = engine.history(
        &args.key,
        HistoryQuery {
            reverse: args.reverse,
            rejections_only: args.rejections,
        },
    )?;
    let rejections = engine.rejection_count(&args.key)?;
    print_json(&json!({
        "key": args.key,
        "rejections": rejections,
        "entries": entries,
    }))
}

fn run_link(ctx: &Context, args: LinkArgs) -> Result<()> {
    let graph = ctx.relationships();
    let closes_cycle = graph.would_create_cycle(&args.from, &args.to, args.rel_type, &ctx.cancel)?;
    let rel = graph.create(&args.from, &args.to, args.rel_type, &ctx.cancel)?;
    let mut out = serde_json::to_value(&rel)?;
    if let Value::Object(map) = &mut out {
        map.insert("closes_cycle".to_string(), Value::Bool(closes_cycle));
    }
    print_json(&out)
}

fn run_unlink(ctx: &Context, args: UnlinkArgs) -> Result<()> {
    let graph = ctx.relationships();
    let removed = match (args.id, args.from, args.to) {
        (Some(id), _, _) => {
            graph.delete(id, &ctx.cancel)?;
            1
        }
        (None, Some(from), Some(to)) => {
            graph.delete_by_pair(&from, &to, args.rel_type, &ctx.cancel)?
        }
        _ => anyhow::bail!("either --id or both endpoints are required"),
    };
    print_json(&json!({ "removed": removed }))
}

fn run_deps(ctx: &Context, args: DepsArgs) -> Result<()> {
    let max_depth = args
        .max_depth
        .unwrap_or(ctx.config.dependencies.max_tree_depth);
    let builder = DependencyTreeBuilder::new(Arc::clone(&ctx.store)).with_max_depth(max_depth);
    let tree = if args.dependents {
        builder.build_dependents_tree(&args.key, &ctx.cancel)?
    } else {
        builder.build_tree(&args.key, &ctx.cancel)?
    };
    print_json(&tree)
}

fn run_next(ctx: &Context) -> Result<()> {
    let selector = NextWorkSelector::new(Arc::clone(&ctx.store), ctx.workflow.clone());
    let batch = selector.next(&ctx.cancel)?;
    print_json(&batch)
}

fn run_complete(ctx: &Context, args: CompleteArgs) -> Result<()> {
    let target = ctx.workflow.load().cascade_status().to_string();
    let mut request = TransitionRequest::new(args.key, target).force(args.force);
    request.agent = args.agent;
    request.notes = args.notes;
    let outcome = ctx.engine().transition(&request, &ctx.cancel)?;
    print_json(&outcome)
}

fn run_pin(ctx: &Context, args: PinArgs) -> Result<()> {
    let item = ctx
        .engine()
        .set_status_override(&args.key, !args.release, &ctx.cancel)?;
    print_json(&item)
}
