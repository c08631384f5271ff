use colored::Colorize;
use nest_chat::ChatSession;
use nest_core::{
    assemble_context, layout_tree, ChatMessage, Conversation, ConversationId, Role, TreeLayout,
};
use tokio_util::sync::CancellationToken;

pub fn role_label(role: Role) -> colored::ColoredString {
    match role {
        Role::User => "you".green().bold(),
        Role::Assistant => "assistant".cyan().bold(),
        Role::System => "system".yellow().bold(),
    }
}

/// Numbered transcript of one conversation. Numbers are what `/branch` takes.
pub fn print_transcript(conversation: &Conversation) {
    println!("{}", format!("== {} ==", conversation.title).bold());
    if conversation.messages.is_empty() {
        println!("{}", "(no messages yet)".dimmed());
    }
    for (i, message) in conversation.messages.iter().enumerate() {
        println!("[{}] {}: {}", i + 1, role_label(message.role), message.content);
    }
}

pub fn print_context(context: &[ChatMessage]) {
    for (i, message) in context.iter().enumerate() {
        println!("{:>3}. {}: {}", i + 1, role_label(message.role), message.content);
    }
}

pub fn print_breadcrumb(path: &[std::sync::Arc<Conversation>]) {
    let titles: Vec<&str> = path.iter().map(|c| c.title.as_str()).collect();
    println!("{}", titles.join(" / ").dimmed());
}

pub fn print_layout(layout: &TreeLayout) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(layout)?);
    Ok(())
}

fn print_tree_outline(layout: &TreeLayout) {
    for node in &layout.nodes {
        let marker = if node.active { "*" } else { " " };
        println!(
            "{marker} {}{}  ({:.0}, {:.0})",
            "  ".repeat(node.depth),
            node.title,
            node.x,
            node.y
        );
    }
}

/// Ask a question, branch on the answer, then return to the root.
pub async fn demo(session: &ChatSession) -> anyhow::Result<()> {
    let store = session.store();
    let cancel = CancellationToken::new();
    let config = session.config();

    let root = store.create_root();
    let first = session.send(root, "Explain X", &cancel).await?;

    let selected = "X is";
    let branched = session
        .branch_and_ask(root, first.assistant_message_id, selected, &cancel)
        .await?;
    let branch: ConversationId = branched.conversation_id;

    for id in [root, branch] {
        if let Some(conversation) = store.conversation(id) {
            print_transcript(&conversation);
            println!();
        }
    }

    println!("{}", "Path to branch".bold());
    print_breadcrumb(&store.path_to_root(branch)?);

    println!("\n{}", "Context sent for the branch".bold());
    print_context(&assemble_context(&store.snapshot(), branch, &config.context)?);

    println!("\n{}", "Context for the root".bold());
    print_context(&assemble_context(&store.snapshot(), root, &config.context)?);

    let layout = layout_tree(&store.snapshot(), branch, &config.layout)?;
    println!("\n{}", "Tree".bold());
    print_tree_outline(&layout);
    Ok(())
}
