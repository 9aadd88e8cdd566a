use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Args, Subcommand};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::error;

use crate::{
    board::{
        BoardEngine, CancelReason, DragMove, EngineError, GroupedTasks, MoveError, MoveOutcome,
        Point, PointerInput, Rect, Release, lock,
    },
    input::{InputEvent, RecordedEvent},
    notification::{BackendNotifier, Notifier, RecordingNotifier},
    remote::{ColumnSource, HttpBoardClient, InMemoryBoard, RepositoryError, TaskRepository},
    settings::Settings,
    types::{Column, ColumnId, Priority, TaskFilters, TaskId},
};

const SCHEMA_VERSION: &str = "cli.v1";

#[derive(Debug, Clone, Subcommand)]
pub enum RootCommand {
    /// List the project's configured columns in display order.
    Columns,
    /// Show visible tasks grouped by column.
    Board(BoardArgs),
    /// Move a task to another column.
    Move(MoveArgs),
    /// Run a recorded pointer script through the drag engine.
    Replay(ReplayArgs),
}

impl RootCommand {
    fn name(&self) -> &'static str {
        match self {
            RootCommand::Columns => "columns",
            RootCommand::Board(_) => "board",
            RootCommand::Move(_) => "move",
            RootCommand::Replay(_) => "replay",
        }
    }

    fn persists_fixture(&self) -> bool {
        match self {
            RootCommand::Move(_) => true,
            RootCommand::Replay(args) => args.persist,
            RootCommand::Columns | RootCommand::Board(_) => false,
        }
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    #[arg(long, value_name = "ID")]
    pub assignee: Option<String>,

    #[arg(long, value_name = "P1..P4", value_parser = parse_priority)]
    pub priority: Option<Priority>,

    #[arg(long, value_name = "NAME")]
    pub category: Option<String>,

    #[arg(long, value_name = "TEXT")]
    pub search: Option<String>,
}

impl From<FilterArgs> for TaskFilters {
    fn from(args: FilterArgs) -> Self {
        TaskFilters {
            assignee: args.assignee,
            priority: args.priority,
            category: args.category,
            search: args.search,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct BoardArgs {
    #[command(flatten)]
    pub filters: FilterArgs,
}

#[derive(Debug, Clone, Args)]
pub struct MoveArgs {
    #[arg(long, value_name = "TASK_ID")]
    pub task: String,

    #[arg(long, value_name = "COLUMN_ID")]
    pub to: String,
}

#[derive(Debug, Clone, Args)]
pub struct ReplayArgs {
    #[arg(long, value_name = "PATH")]
    pub script: PathBuf,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Write the resulting board back to the fixture file.
    #[arg(long)]
    pub persist: bool,
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    raw.parse()
}

/// Where commands read and write board data.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub project: String,
    pub server: Option<String>,
    pub fixture: Option<PathBuf>,
    pub settings: Settings,
}

pub async fn run(context: CliContext, command: RootCommand, json_output: bool, quiet: bool) -> i32 {
    let result = match context.fixture.clone() {
        Some(path) => execute_fixture(&path, &context, command).await,
        None => execute_http(&context, command).await,
    };

    match result {
        Ok(output) => {
            print_success(output, json_output, quiet);
            0
        }
        Err(err) => {
            print_error(&err, json_output);
            err.exit_code
        }
    }
}

struct CommandOutput {
    command: &'static str,
    project: String,
    data: Value,
    text: String,
}

#[derive(Debug)]
struct CliError {
    exit_code: i32,
    code: &'static str,
    message: String,
    details: Option<Value>,
}

type CliResult<T> = Result<T, CliError>;

async fn execute_fixture(
    path: &Path,
    context: &CliContext,
    command: RootCommand,
) -> CliResult<CommandOutput> {
    let board = InMemoryBoard::load_fixture(path)
        .map_err(|err| not_found_error("FIXTURE_UNREADABLE", format!("{err:#}")))?;
    let board = Arc::new(board);
    let persist = command.persists_fixture();
    let output = execute(Arc::clone(&board), context, command).await?;
    if persist {
        board
            .save_fixture(path)
            .map_err(|err| runtime_error(format!("{err:#}")))?;
    }
    Ok(output)
}

async fn execute_http(context: &CliContext, command: RootCommand) -> CliResult<CommandOutput> {
    let mut config = context.settings.server_config();
    if let Some(server) = context.server.as_deref() {
        config.base_url = server.to_string();
    }
    let client = HttpBoardClient::new(config).map_err(runtime_error)?;
    execute(Arc::new(client), context, command).await
}

async fn execute<R: TaskRepository + ColumnSource>(
    remote: Arc<R>,
    context: &CliContext,
    command: RootCommand,
) -> CliResult<CommandOutput> {
    let name = command.name();
    let (data, text) = match command {
        RootCommand::Columns => columns_command(remote, context).await?,
        RootCommand::Board(args) => board_command(remote, context, args).await?,
        RootCommand::Move(args) => {
            move_command(remote, context, default_notifier(&context.settings), args).await?
        }
        RootCommand::Replay(args) => replay_command(remote, context, args).await?,
    };
    Ok(CommandOutput {
        command: name,
        project: context.project.clone(),
        data,
        text,
    })
}

async fn load_engine<R: TaskRepository + ColumnSource>(
    remote: Arc<R>,
    context: &CliContext,
    notifier: Arc<dyn Notifier>,
    filters: TaskFilters,
) -> CliResult<BoardEngine<R>> {
    let mut engine = BoardEngine::new(remote, context.settings.engine_config(), notifier)
        .with_filters(filters);
    engine
        .load(&context.project)
        .await
        .map_err(engine_error)?;
    Ok(engine)
}

fn default_notifier(settings: &Settings) -> Arc<dyn Notifier> {
    Arc::new(BackendNotifier::new(
        settings.notification_backend(),
        settings.notification_display_duration_ms,
    ))
}

async fn columns_command<R: ColumnSource>(
    remote: Arc<R>,
    context: &CliContext,
) -> CliResult<(Value, String)> {
    let columns = remote
        .list_columns(&context.project)
        .await
        .map_err(repository_error)?;
    let data = json!({ "columns": columns });
    Ok((data, render_columns_text(&columns)))
}

fn render_columns_text(columns: &[Column]) -> String {
    if columns.is_empty() {
        return "No columns configured.".to_string();
    }
    let rows = columns
        .iter()
        .map(|column| {
            vec![
                column.id.to_string(),
                column.title.clone(),
                column.status.clone(),
                column.color.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect::<Vec<_>>();
    render_text_table(&["ID", "Title", "Status", "Color"], &rows)
}

async fn board_command<R: TaskRepository + ColumnSource>(
    remote: Arc<R>,
    context: &CliContext,
    args: BoardArgs,
) -> CliResult<(Value, String)> {
    let engine = load_engine(
        remote,
        context,
        default_notifier(&context.settings),
        args.filters.into(),
    )
    .await?;
    let board = engine.board();
    Ok((
        board_json(&board, engine.filters()),
        render_board_text(&board),
    ))
}

fn board_json(board: &GroupedTasks, filters: &TaskFilters) -> Value {
    json!({
        "columns": board
            .groups()
            .iter()
            .map(|group| json!({
                "id": group.column.id,
                "title": group.column.title,
                "status": group.column.status,
                "tasks": group.tasks,
            }))
            .collect::<Vec<_>>(),
        "hidden": board.hidden(),
        "filters": filters,
    })
}

fn render_board_text(board: &GroupedTasks) -> String {
    let rows = board
        .groups()
        .iter()
        .flat_map(|group| {
            group.tasks.iter().map(|task| {
                vec![
                    group.column.title.clone(),
                    task.id.to_string(),
                    task.title.replace('\n', " "),
                    task.priority.as_str().to_string(),
                    task.assignee_name
                        .clone()
                        .or_else(|| task.assignee_id.clone())
                        .unwrap_or_else(|| "-".to_string()),
                ]
            })
        })
        .collect::<Vec<_>>();

    let mut text = if rows.is_empty() {
        "No tasks match.".to_string()
    } else {
        render_text_table(&["Column", "ID", "Title", "Priority", "Assignee"], &rows)
    };
    if !board.hidden().is_empty() {
        text.push_str(&format!(
            "\n{} task(s) hidden: status not mapped to a column",
            board.hidden().len()
        ));
    }
    text
}

fn render_text_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();

    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            let width = cell.chars().count();
            if width > widths[index] {
                widths[index] = width;
            }
        }
    }

    let border = format!(
        "+{}+",
        widths
            .iter()
            .map(|width| "-".repeat(*width + 2))
            .collect::<Vec<_>>()
            .join("+")
    );
    let render_row = |cells: Vec<&str>| {
        format!(
            "| {} |",
            cells
                .iter()
                .enumerate()
                .map(|(index, cell)| format!("{cell:<width$}", width = widths[index]))
                .collect::<Vec<_>>()
                .join(" | ")
        )
    };

    let mut lines = vec![border.clone(), render_row(headers.to_vec()), border.clone()];
    for row in rows {
        lines.push(render_row(row.iter().map(String::as_str).collect()));
    }
    lines.push(border);
    lines.join("\n")
}

async fn move_command<R: TaskRepository + ColumnSource>(
    remote: Arc<R>,
    context: &CliContext,
    notifier: Arc<dyn Notifier>,
    args: MoveArgs,
) -> CliResult<(Value, String)> {
    let engine = load_engine(remote, context, notifier, TaskFilters::default()).await?;
    let task_id = TaskId::new(args.task);
    let to = ColumnId::new(args.to);

    let from = engine.column_of(&task_id).ok_or_else(|| {
        not_found_error(
            "TASK_NOT_FOUND",
            format!("task '{task_id}' is not on the board"),
        )
    })?;

    let outcome = engine
        .move_task(&task_id, &to)
        .await
        .map_err(move_error)?;

    match outcome {
        MoveOutcome::Committed(task) => {
            let text = format!("moved task {} from {} to {}", task.id, from, to);
            Ok((json!({ "task": task, "from": from, "to": to }), text))
        }
        MoveOutcome::Unchanged | MoveOutcome::Superseded => {
            let task = lock(engine.collection()).get(&task_id).cloned();
            let text = format!("task {task_id} is already in {to}");
            Ok((json!({ "task": task, "from": from, "to": to, "unchanged": true }), text))
        }
    }
}

/// A recorded pointer session, in board coordinates.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    #[serde(default = "default_viewport")]
    pub viewport: Rect,
    #[serde(default)]
    pub gap: Option<f64>,
    pub steps: Vec<ReplayStep>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStep {
    Down { task: String, x: f64, y: f64 },
    Move { x: f64, y: f64 },
    Up { x: f64, y: f64 },
    Scroll { x: f64 },
    Leave,
    Cancel,
    Refresh,
    /// Raw terminal input, translated the way a terminal host does.
    Terminal(RecordedEvent),
}

/// Layout a replay is currently drawn with.
#[derive(Debug, Clone, Copy)]
struct ReplayView {
    viewport: Rect,
    gap: f64,
    scroll_x: f64,
}

fn default_viewport() -> Rect {
    Rect::new(0.0, 0.0, 320.0, 100.0)
}

async fn replay_command<R: TaskRepository + ColumnSource>(
    remote: Arc<R>,
    context: &CliContext,
    args: ReplayArgs,
) -> CliResult<(Value, String)> {
    let contents = fs::read_to_string(&args.script).map_err(|err| {
        not_found_error(
            "SCRIPT_UNREADABLE",
            format!("failed to read '{}': {err}", args.script.display()),
        )
    })?;
    let script: ReplayScript = serde_json::from_str(&contents).map_err(|err| {
        usage_error(
            "SCRIPT_INVALID",
            format!("failed to parse '{}': {err}", args.script.display()),
        )
    })?;

    let notifier = RecordingNotifier::default();
    let mut engine = load_engine(
        remote,
        context,
        Arc::new(notifier.clone()),
        args.filters.into(),
    )
    .await?;
    let mut view = ReplayView {
        viewport: script.viewport,
        gap: script.gap.unwrap_or(context.settings.column_gap),
        scroll_x: 0.0,
    };
    engine
        .update_layout(view.viewport, view.gap, view.scroll_x)
        .map_err(engine_error)?;

    let mut events = Vec::with_capacity(script.steps.len());
    for (index, step) in script.steps.into_iter().enumerate() {
        let result = replay_step(&mut engine, &mut view, step).await?;
        events.push(json!({ "step": index, "result": result }));
    }

    let board = engine.board();
    let notices = notifier
        .notices()
        .into_iter()
        .map(|notice| json!({ "summary": notice.summary, "body": notice.body }))
        .collect::<Vec<_>>();
    let mut text = render_board_text(&board);
    for notice in &notifier.notices() {
        text.push_str(&format!("\n! {}: {}", notice.summary, notice.body));
    }
    let data = json!({
        "events": events,
        "notices": notices,
        "board": board_json(&board, engine.filters()),
    });
    Ok((data, text))
}

async fn replay_step<R: TaskRepository + ColumnSource>(
    engine: &mut BoardEngine<R>,
    view: &mut ReplayView,
    step: ReplayStep,
) -> CliResult<Value> {
    let value = match step {
        ReplayStep::Down { task, x, y } => {
            pointer_step(
                engine,
                PointerInput::Down {
                    task_id: TaskId::new(task),
                    at: Point::new(x, y),
                },
            )
            .await
        }
        ReplayStep::Move { x, y } => {
            pointer_step(engine, PointerInput::Move { at: Point::new(x, y) }).await
        }
        ReplayStep::Up { x, y } => {
            pointer_step(engine, PointerInput::Up { at: Point::new(x, y) }).await
        }
        ReplayStep::Scroll { x } => {
            view.scroll_x = x;
            relayout_step(engine, view, "scroll")?
        }
        ReplayStep::Leave => pointer_step(engine, PointerInput::Leave).await,
        ReplayStep::Cancel => pointer_step(engine, PointerInput::Cancel).await,
        ReplayStep::Refresh => {
            engine.refresh().await.map_err(engine_error)?;
            json!({ "action": "refresh" })
        }
        ReplayStep::Terminal(event) => match event.to_input() {
            Some(InputEvent::Pointer(input)) => pointer_step(engine, input).await,
            Some(InputEvent::Resize(width, height)) => {
                view.viewport.width = f64::from(width);
                view.viewport.height = f64::from(height);
                relayout_step(engine, view, "resize")?
            }
            None => json!({ "action": "ignored" }),
        },
    };
    Ok(value)
}

async fn pointer_step<R: TaskRepository + ColumnSource>(
    engine: &mut BoardEngine<R>,
    input: PointerInput,
) -> Value {
    match input {
        PointerInput::Down { task_id, at } => {
            let armed = engine.pointer_down(&task_id, at);
            json!({ "action": "down", "armed": armed })
        }
        PointerInput::Move { at } => {
            let drag = engine.pointer_move(at);
            json!({
                "action": "move",
                "drag": drag_move_label(&drag),
                "candidate": engine.drag().candidate_column(),
            })
        }
        PointerInput::Up { at } => release_json(engine.pointer_up(at)).await,
        input @ (PointerInput::Leave | PointerInput::Cancel) => {
            let cancelled = engine.dispatch(input).is_some();
            json!({ "action": "cancel", "cancelled": cancelled })
        }
    }
}

fn relayout_step<R: TaskRepository + ColumnSource>(
    engine: &mut BoardEngine<R>,
    view: &ReplayView,
    action: &'static str,
) -> CliResult<Value> {
    let drag = engine
        .update_layout(view.viewport, view.gap, view.scroll_x)
        .map_err(engine_error)?;
    Ok(json!({
        "action": action,
        "drag": drag_move_label(&drag),
        "candidate": engine.drag().candidate_column(),
    }))
}

fn drag_move_label(drag: &DragMove) -> &'static str {
    match drag {
        DragMove::Ignored => "ignored",
        DragMove::Pending => "pending",
        DragMove::Started => "started",
        DragMove::Moved => "moved",
        DragMove::Aborted(_) => "aborted",
    }
}

async fn release_json<R: TaskRepository>(release: Release<R>) -> Value {
    let kind = release.kind();
    match release {
        Release::Ignored => json!({ "action": "up", "release": kind }),
        Release::Click(task_id) => json!({ "action": "up", "release": kind, "task": task_id }),
        Release::Cancelled(reason) => json!({
            "action": "up",
            "release": kind,
            "reason": cancel_reason_label(reason),
        }),
        Release::Aborted(err) => json!({ "action": "up", "release": kind, "error": err.to_string() }),
        Release::Failed(err) => json!({
            "action": "up",
            "release": kind,
            "error": err.to_string(),
            "kind": err.kind(),
        }),
        Release::Committed(pending) => {
            let intent = pending.intent().clone();
            let settled = match pending.resolve().await {
                Ok(MoveOutcome::Committed(task)) => json!({ "outcome": "committed", "status": task.status }),
                Ok(MoveOutcome::Superseded) => json!({ "outcome": "superseded" }),
                Ok(MoveOutcome::Unchanged) => json!({ "outcome": "unchanged" }),
                Err(err) => json!({ "outcome": "rolled_back", "kind": err.kind(), "error": err.to_string() }),
            };
            json!({
                "action": "up",
                "release": kind,
                "task": intent.task_id,
                "from": intent.from_column,
                "to": intent.to_column,
                "settled": settled,
            })
        }
    }
}

fn cancel_reason_label(reason: CancelReason) -> &'static str {
    match reason {
        CancelReason::NoTarget => "no_target",
        CancelReason::SameColumn => "same_column",
        CancelReason::Cancelled => "cancelled",
    }
}

fn usage_error(code: &'static str, message: impl Into<String>) -> CliError {
    CliError {
        exit_code: 2,
        code,
        message: message.into(),
        details: None,
    }
}

fn not_found_error(code: &'static str, message: impl Into<String>) -> CliError {
    CliError {
        exit_code: 3,
        code,
        message: message.into(),
        details: None,
    }
}

fn conflict_error(code: &'static str, message: impl Into<String>, details: Option<Value>) -> CliError {
    CliError {
        exit_code: 4,
        code,
        message: message.into(),
        details,
    }
}

fn runtime_error(err: impl std::fmt::Display) -> CliError {
    CliError {
        exit_code: 5,
        code: "RUNTIME_ERROR",
        message: err.to_string(),
        details: None,
    }
}

fn repository_error(err: RepositoryError) -> CliError {
    match err {
        RepositoryError::NotFound(what) => not_found_error("NOT_FOUND", format!("{what} not found")),
        RepositoryError::Timeout(_) | RepositoryError::Network(_) => CliError {
            exit_code: 5,
            code: "REMOTE_UNAVAILABLE",
            message: err.to_string(),
            details: None,
        },
        other => runtime_error(other),
    }
}

fn engine_error(err: EngineError) -> CliError {
    match err {
        EngineError::Remote(err) => repository_error(err),
        EngineError::Columns(err) => CliError {
            exit_code: 5,
            code: "COLUMN_CONFIG_INVALID",
            message: err.to_string(),
            details: None,
        },
        EngineError::Layout(err) => usage_error("LAYOUT_INVALID", err.to_string()),
    }
}

fn move_error(err: MoveError) -> CliError {
    let details = Some(json!({ "kind": err.kind(), "retryable": err.is_retryable() }));
    match &err {
        MoveError::UnknownTask(_) => not_found_error("TASK_NOT_FOUND", err.to_string()),
        MoveError::UnknownColumn(_) => not_found_error("COLUMN_NOT_FOUND", err.to_string()),
        MoveError::Rejected { .. } => conflict_error("MOVE_REJECTED", err.to_string(), details),
        MoveError::Conflict { .. } => conflict_error("MOVE_CONFLICT", err.to_string(), details),
        MoveError::Timeout { .. } | MoveError::Network { .. } => CliError {
            exit_code: 5,
            code: "MOVE_FAILED",
            message: err.to_string(),
            details,
        },
    }
}

fn print_success(output: CommandOutput, json_output: bool, quiet: bool) {
    if json_output {
        let payload = json!({
            "schema_version": SCHEMA_VERSION,
            "command": output.command,
            "project": output.project,
            "data": output.data
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(value) => println!("{value}"),
            Err(_) => println!("{}", payload),
        }
        return;
    }

    if quiet {
        return;
    }

    if output.text.is_empty() {
        println!("ok");
    } else {
        println!("{}", output.text);
    }
}

fn print_error(err: &CliError, json_output: bool) {
    error!(
        code = err.code,
        message = %err.message,
        details = ?err.details,
        "cli command failed"
    );

    if json_output {
        let payload = json!({
            "schema_version": SCHEMA_VERSION,
            "error": {
                "code": err.code,
                "message": err.message,
                "details": err.details
            }
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(value) => eprintln!("{value}"),
            Err(_) => eprintln!("{}", payload),
        }
        return;
    }

    eprintln!("error[{}]: {}", err.code, err.message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::BoardFixture;
    use crate::types::Task;
    use tempfile::TempDir;

    fn fixture() -> BoardFixture {
        BoardFixture {
            columns: vec![
                Column::new("todo", "To Do", "TODO"),
                Column::new("doing", "Doing", "DOING"),
                Column::new("done", "Done", "DONE"),
            ],
            tasks: vec![
                Task::new("t1", "Write docs", "TODO").with_priority(Priority::P1),
                Task::new("t2", "Fix bug", "DOING").with_priority(Priority::P2),
                Task::new("t3", "Old", "ARCHIVED"),
            ],
        }
    }

    fn context() -> CliContext {
        CliContext {
            project: "demo".to_string(),
            server: None,
            fixture: None,
            settings: Settings {
                notification_backend: "none".to_string(),
                ..Settings::default()
            },
        }
    }

    fn remote() -> Arc<InMemoryBoard> {
        Arc::new(InMemoryBoard::from_fixture(fixture()))
    }

    #[test]
    fn text_table_pads_columns_to_widest_cell() {
        let table = render_text_table(
            &["ID", "Title"],
            &[vec!["t1".to_string(), "A longer title".to_string()]],
        );
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "+----+----------------+");
        assert_eq!(lines[1], "| ID | Title          |");
        assert_eq!(lines[3], "| t1 | A longer title |");
    }

    #[tokio::test]
    async fn board_command_reports_hidden_tasks() {
        let output = execute(remote(), &context(), RootCommand::Board(BoardArgs {
            filters: FilterArgs::default(),
        }))
        .await
        .expect("board");
        assert_eq!(output.command, "board");
        assert_eq!(output.data["hidden"], json!(["t3"]));
        assert_eq!(output.data["columns"][0]["tasks"][0]["id"], json!("t1"));
        assert!(output.text.contains("1 task(s) hidden"));
    }

    #[tokio::test]
    async fn board_command_applies_priority_filter() {
        let args = BoardArgs {
            filters: FilterArgs {
                priority: Some(Priority::P2),
                ..FilterArgs::default()
            },
        };
        let output = execute(remote(), &context(), RootCommand::Board(args))
            .await
            .expect("board");
        assert_eq!(output.data["columns"][0]["tasks"], json!([]));
        assert_eq!(output.data["columns"][1]["tasks"][0]["id"], json!("t2"));
    }

    #[tokio::test]
    async fn move_command_updates_remote_and_reports_columns() {
        let remote = remote();
        let args = MoveArgs {
            task: "t1".to_string(),
            to: "done".to_string(),
        };
        let output = execute(Arc::clone(&remote), &context(), RootCommand::Move(args))
            .await
            .expect("move");
        assert_eq!(output.data["from"], json!("todo"));
        assert_eq!(output.data["task"]["status"], json!("DONE"));
        assert_eq!(
            remote.task(&"t1".into()).map(|task| task.status),
            Some("DONE".to_string())
        );
    }

    #[tokio::test]
    async fn move_command_maps_failures_to_exit_codes() {
        let remote = remote();
        let missing = execute(
            Arc::clone(&remote),
            &context(),
            RootCommand::Move(MoveArgs {
                task: "t3".to_string(),
                to: "done".to_string(),
            }),
        )
        .await
        .err()
        .expect("hidden task cannot be moved");
        assert_eq!(missing.exit_code, 3);
        assert_eq!(missing.code, "TASK_NOT_FOUND");

        remote.fail_next_moves([RepositoryError::Conflict("locked".to_string())]);
        let conflict = execute(
            Arc::clone(&remote),
            &context(),
            RootCommand::Move(MoveArgs {
                task: "t1".to_string(),
                to: "doing".to_string(),
            }),
        )
        .await
        .err()
        .expect("conflict");
        assert_eq!(conflict.exit_code, 4);
        assert_eq!(conflict.code, "MOVE_CONFLICT");
    }

    #[tokio::test]
    async fn failed_move_raises_a_notice() {
        let remote = remote();
        remote.fail_next_moves([RepositoryError::Rejected("frozen".to_string())]);
        let notifier = RecordingNotifier::default();
        let err = move_command(
            Arc::clone(&remote),
            &context(),
            Arc::new(notifier.clone()),
            MoveArgs {
                task: "t2".to_string(),
                to: "done".to_string(),
            },
        )
        .await
        .err()
        .expect("rejected");
        assert_eq!(err.code, "MOVE_REJECTED");
        let notices = notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].summary, "Move rejected");
    }

    #[tokio::test]
    async fn replay_accepts_recorded_terminal_events() {
        let temp = TempDir::new().expect("temp dir");
        let script = temp.path().join("terminal.json");
        fs::write(
            &script,
            r#"{
                "viewport": {"x": 0, "y": 0, "width": 320, "height": 100},
                "gap": 10,
                "steps": [
                    {"terminal": {"mouse_down": {"column": 50, "row": 5, "task": "t1"}}},
                    {"terminal": {"mouse_drag": {"column": 150, "row": 5}}},
                    {"terminal": {"resize": {"width": 430, "height": 40}}},
                    {"terminal": "focus_lost"},
                    {"terminal": {"mouse_down": {"column": 50, "row": 5, "task": "t1"}}},
                    {"terminal": {"mouse_drag": {"column": 350, "row": 5}}},
                    {"terminal": {"mouse_up": {"column": 350, "row": 5}}},
                    {"terminal": {"mouse_down": {"column": 5, "row": 5}}}
                ]
            }"#,
        )
        .expect("write script");

        let args = ReplayArgs {
            script,
            filters: FilterArgs::default(),
            persist: false,
        };
        let output = execute(remote(), &context(), RootCommand::Replay(args))
            .await
            .expect("replay");
        let events = &output.data["events"];
        assert_eq!(events[0]["result"]["armed"], json!(true));
        assert_eq!(events[1]["result"]["candidate"], json!("doing"));
        assert_eq!(events[2]["result"]["action"], json!("resize"));
        assert_eq!(events[3]["result"]["cancelled"], json!(true));
        assert_eq!(events[6]["result"]["to"], json!("done"));
        assert_eq!(events[6]["result"]["settled"]["outcome"], json!("committed"));
        assert_eq!(events[7]["result"]["action"], json!("ignored"));
    }

    #[test]
    fn replay_script_parses_tagged_steps() {
        let script: ReplayScript = serde_json::from_str(
            r#"{
                "gap": 10,
                "steps": [
                    {"down": {"task": "t1", "x": 50, "y": 50}},
                    {"move": {"x": 150, "y": 50}},
                    {"scroll": {"x": 20}},
                    "cancel",
                    {"up": {"x": 150, "y": 50}}
                ]
            }"#,
        )
        .expect("script");
        assert_eq!(script.viewport, default_viewport());
        assert_eq!(script.gap, Some(10.0));
        assert_eq!(script.steps[3], ReplayStep::Cancel);
        assert_eq!(
            script.steps[0],
            ReplayStep::Down {
                task: "t1".to_string(),
                x: 50.0,
                y: 50.0
            }
        );
    }

    #[tokio::test]
    async fn replay_drives_drag_through_engine() {
        let temp = TempDir::new().expect("temp dir");
        let script = temp.path().join("drag.json");
        fs::write(
            &script,
            r#"{
                "viewport": {"x": 0, "y": 0, "width": 320, "height": 100},
                "gap": 10,
                "steps": [
                    {"down": {"task": "t1", "x": 50, "y": 50}},
                    {"move": {"x": 150, "y": 50}},
                    {"up": {"x": 150, "y": 50}}
                ]
            }"#,
        )
        .expect("write script");

        let args = ReplayArgs {
            script,
            filters: FilterArgs::default(),
            persist: false,
        };
        let output = execute(remote(), &context(), RootCommand::Replay(args))
            .await
            .expect("replay");
        let events = &output.data["events"];
        assert_eq!(events[1]["result"]["drag"], json!("started"));
        assert_eq!(events[1]["result"]["candidate"], json!("doing"));
        assert_eq!(events[2]["result"]["release"], json!("committed"));
        assert_eq!(events[2]["result"]["settled"]["outcome"], json!("committed"));
        assert_eq!(
            output.data["board"]["columns"][1]["tasks"][0]["id"],
            json!("t1")
        );
    }

    #[tokio::test]
    async fn fixture_move_is_persisted() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("board.json");
        InMemoryBoard::from_fixture(fixture())
            .save_fixture(&path)
            .expect("save fixture");

        let output = execute_fixture(
            &path,
            &context(),
            RootCommand::Move(MoveArgs {
                task: "t2".to_string(),
                to: "done".to_string(),
            }),
        )
        .await
        .expect("move");
        assert_eq!(output.project, "demo");

        let reloaded = InMemoryBoard::load_fixture(&path).expect("reload");
        assert_eq!(
            reloaded.task(&"t2".into()).map(|task| task.status),
            Some("DONE".to_string())
        );
    }
}
