use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use nest_chat::{ChatEvent, ChatSession, LLMProvider, SendStatus};
use nest_core::{assemble_context, layout_tree, Config, ConversationId, ConversationStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::render;

const HELP: &str = "\
Type a message to send it to the active conversation.
  /new                     start a new conversation tree
  /roots                   list conversation trees
  /root <n>                switch to tree <n> from /roots
  /tabs                    list conversations in the current tree
  /open <n>                switch to conversation <n> from /tabs
  /up                      go to the parent conversation
  /branch <msg#> <text>    branch on <text> from message <msg#> and ask about it
  /title <text>            rename the active conversation
  /show                    print the active conversation
  /path                    print the path from the root
  /context                 print the context that would be sent
  /tree                    print the tree layout as JSON
  /delete                  delete the active conversation
  /help                    show this help
  /quit                    exit";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Say(String),
    New,
    Roots,
    Root(usize),
    Tabs,
    Open(usize),
    Up,
    Branch { message: usize, text: String },
    Title(String),
    Show,
    Path,
    Context,
    Tree,
    Delete,
    Help,
    Quit,
}

impl ReplCommand {
    /// `Ok(None)` for a blank line.
    fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Self::Say(line.to_string())));
        };

        let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let args = args.trim();
        let command = match name {
            "new" => Self::New,
            "roots" => Self::Roots,
            "root" => Self::Root(parse_index(args)?),
            "tabs" => Self::Tabs,
            "open" => Self::Open(parse_index(args)?),
            "up" => Self::Up,
            "branch" => {
                let (index, text) = args
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("usage: /branch <msg#> <text>"))?;
                let text = text.trim();
                if text.is_empty() {
                    bail!("usage: /branch <msg#> <text>");
                }
                Self::Branch {
                    message: parse_index(index)?,
                    text: text.to_string(),
                }
            }
            "title" if !args.is_empty() => Self::Title(args.to_string()),
            "title" => bail!("usage: /title <text>"),
            "show" => Self::Show,
            "path" => Self::Path,
            "context" => Self::Context,
            "tree" => Self::Tree,
            "delete" => Self::Delete,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => bail!("unknown command /{other}, try /help"),
        };
        Ok(Some(command))
    }
}

/// Routes Ctrl-C: a running turn is cancelled, an idle prompt shuts down.
#[derive(Clone, Default)]
struct Interrupts {
    turn: Arc<Mutex<Option<CancellationToken>>>,
    shutdown: CancellationToken,
}

impl Interrupts {
    fn begin_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.turn.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        token
    }

    fn end_turn(&self) {
        self.turn.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Returns `true` if a turn was cancelled, `false` if shutdown was requested.
    fn interrupt(&self) -> bool {
        match self.turn.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => {
                self.shutdown.cancel();
                false
            }
        }
    }
}

/// The only `ctrl_c` listener for the whole REPL.
async fn listen_for_ctrl_c(interrupts: Interrupts) {
    while tokio::signal::ctrl_c().await.is_ok() {
        if !interrupts.interrupt() {
            break;
        }
    }
}

/// 1-based index as shown in listings.
fn parse_index(raw: &str) -> anyhow::Result<usize> {
    let n: usize = raw
        .trim()
        .parse()
        .with_context(|| format!("expected a number, got {raw:?}"))?;
    if n == 0 {
        bail!("numbers start at 1");
    }
    Ok(n)
}

pub async fn run(
    store: Arc<ConversationStore>,
    provider: Arc<dyn LLMProvider>,
    config: Config,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(64);
    let reply_done = Arc::new(Notify::new());
    tokio::spawn(print_events(rx, Arc::clone(&reply_done)));
    let interrupts = Interrupts::default();
    tokio::spawn(listen_for_ctrl_c(interrupts.clone()));

    let session = ChatSession::new(Arc::clone(&store), provider, config).with_events(tx);
    if store.is_empty() {
        store.create_root();
    }
    println!("{}", "Node Nest - type /help for commands".bold());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".bold());
        std::io::stdout().flush()?;
        let line = tokio::select! {
            _ = interrupts.shutdown.cancelled() => {
                println!();
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        let command = match ReplCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e.to_string().red());
                continue;
            }
        };
        if command == ReplCommand::Quit {
            break;
        }
        if let Err(e) = handle(&session, command, &reply_done, &interrupts).await {
            println!("{}", format!("error: {e:#}").red());
        }
    }
    Ok(())
}

async fn handle(
    session: &ChatSession,
    command: ReplCommand,
    reply_done: &Notify,
    interrupts: &Interrupts,
) -> anyhow::Result<()> {
    let store = session.store();
    let config = session.config();
    let active = store.active();

    match command {
        ReplCommand::Say(text) => {
            let id = match active {
                Some(id) => id,
                None => store.create_root(),
            };
            ask(session, reply_done, interrupts, |cancel| async move {
                session.send(id, &text, &cancel).await
            })
            .await?;
        }
        ReplCommand::Branch { message, text } => {
            let parent = require_active(active)?;
            let conversation = store
                .conversation(parent)
                .ok_or_else(|| anyhow!("active conversation is gone"))?;
            let message_id = conversation
                .messages
                .get(message - 1)
                .map(|m| m.id)
                .ok_or_else(|| anyhow!("no message #{message} in this conversation"))?;
            ask(session, reply_done, interrupts, |cancel| async move {
                session.branch_and_ask(parent, message_id, &text, &cancel).await
            })
            .await?;
        }
        ReplCommand::New => {
            store.create_root();
            println!("{}", "started a new conversation".dimmed());
        }
        ReplCommand::Roots => {
            for (i, root) in store.roots().iter().enumerate() {
                let marker = if Some(root.id) == active { "*" } else { " " };
                println!("{marker} {}. {}", i + 1, root.title);
            }
        }
        ReplCommand::Root(n) => {
            let root = store
                .roots()
                .get(n - 1)
                .map(|c| c.id)
                .ok_or_else(|| anyhow!("no conversation tree #{n}"))?;
            open(session, root);
        }
        ReplCommand::Tabs => {
            let members = store.tree_members(require_active(active)?)?;
            for (i, conversation) in members.iter().enumerate() {
                let marker = if Some(conversation.id) == active { "*" } else { " " };
                println!("{marker} {}. {}", i + 1, conversation.title);
            }
        }
        ReplCommand::Open(n) => {
            let members = store.tree_members(require_active(active)?)?;
            let id = members
                .get(n - 1)
                .map(|c| c.id)
                .ok_or_else(|| anyhow!("no conversation #{n} in this tree"))?;
            open(session, id);
        }
        ReplCommand::Up => {
            let current = store
                .conversation(require_active(active)?)
                .ok_or_else(|| anyhow!("active conversation is gone"))?;
            let parent = current
                .parent_id
                .ok_or_else(|| anyhow!("already at the root"))?;
            open(session, parent);
        }
        ReplCommand::Title(title) => {
            store.set_title(require_active(active)?, title);
        }
        ReplCommand::Show => {
            if let Some(conversation) = store.conversation(require_active(active)?) {
                render::print_transcript(&conversation);
            }
        }
        ReplCommand::Path => {
            render::print_breadcrumb(&store.path_to_root(require_active(active)?)?);
        }
        ReplCommand::Context => {
            let context = assemble_context(&store.snapshot(), require_active(active)?, &config.context)?;
            render::print_context(&context);
        }
        ReplCommand::Tree => {
            let layout = layout_tree(&store.snapshot(), require_active(active)?, &config.layout)?;
            render::print_layout(&layout)?;
        }
        ReplCommand::Delete => {
            store.delete_conversation(require_active(active)?)?;
        }
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Quit => {}
    }
    Ok(())
}

fn require_active(active: Option<ConversationId>) -> anyhow::Result<ConversationId> {
    active.ok_or_else(|| anyhow!("no active conversation, use /new"))
}

fn open(session: &ChatSession, id: ConversationId) {
    let store = session.store();
    store.set_active(id);
    if let Some(conversation) = store.conversation(id) {
        render::print_transcript(&conversation);
    }
}

/// Run one model turn; Ctrl-C stops the reply and keeps what arrived.
async fn ask<F, Fut>(
    session: &ChatSession,
    reply_done: &Notify,
    interrupts: &Interrupts,
    turn: F,
) -> anyhow::Result<()>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: std::future::Future<Output = Result<nest_chat::SendOutcome, nest_chat::ChatError>>,
{
    let cancel = interrupts.begin_turn();

    print!("{}: ", render::role_label(nest_core::Role::Assistant));
    std::io::stdout().flush()?;
    let result = turn(cancel).await;
    interrupts.end_turn();

    let outcome = result?;
    reply_done.notified().await;
    match outcome.status {
        SendStatus::Completed => {}
        SendStatus::Cancelled => println!("{}", "(reply stopped)".dimmed()),
        SendStatus::Failed => tracing::debug!(error = ?outcome.error, "reply failed"),
    }
    if session.store().active() != Some(outcome.conversation_id) {
        session.store().set_active(outcome.conversation_id);
    }
    Ok(())
}

async fn print_events(mut rx: mpsc::Receiver<ChatEvent>, reply_done: Arc<Notify>) {
    while let Some(event) = rx.recv().await {
        match event {
            ChatEvent::Token { content, .. } => {
                print!("{content}");
                let _ = std::io::stdout().flush();
            }
            ChatEvent::Completed { .. } => {
                println!();
                reply_done.notify_one();
            }
            ChatEvent::Failed { error, .. } => {
                println!("{}", format!("[{error}]").red());
                reply_done.notify_one();
            }
        }
    }
}
