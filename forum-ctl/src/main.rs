use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use forum_api::{DocId, ReplyRef, SortMode, Subject, SubjectId, VoteAction};
use forum_client::{
    CommentEngine, EngineConfig, FileStorage, IdentityResolver, RenderView, ReplyAppend,
    StaticIdentity,
};
use forum_mock_store::{MemoryStore, StoreDump};

#[derive(structopt::StructOpt)]
struct Opt {
    /// JSON file holding the whole document store, created if missing
    #[structopt(short, long, parse(from_os_str))]
    store: PathBuf,

    /// Where the anonymous identity is remembered between runs
    #[structopt(long, parse(from_os_str), default_value = ".forum-state")]
    state_dir: PathBuf,

    /// Act as this authenticated user id instead of anonymously
    #[structopt(short, long)]
    user: Option<String>,

    /// Display name of the authenticated user
    #[structopt(short, long, requires = "user")]
    name: Option<String>,

    /// Give up on store operations after this many milliseconds
    #[structopt(long)]
    timeout_ms: Option<u64>,

    /// Append replies with the store's atomic array union
    #[structopt(long)]
    atomic_replies: bool,

    /// recency or votes
    #[structopt(long, default_value = "recency")]
    sort: SortMode,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Print all comments
    List,

    /// Post a new comment
    Post {
        text: String,

        /// Name to post under
        #[structopt(long)]
        label: Option<String>,
    },

    /// Reply to a comment, or to one of its replies
    Reply {
        comment: String,

        text: String,

        /// Reply id, or `#index` for its position
        #[structopt(long)]
        to: Option<ReplyRef>,

        /// Name to post under
        #[structopt(long)]
        label: Option<String>,
    },

    /// Toggle an upvote or downvote
    Vote {
        comment: String,

        /// up or down
        action: VoteAction,

        /// Vote on this reply instead of the comment
        #[structopt(long)]
        reply: Option<ReplyRef>,
    },

    /// Delete one of your comments, or one of your replies
    Delete {
        comment: String,

        #[structopt(long)]
        reply: Option<ReplyRef>,
    },
}

fn load_store(path: &Path) -> anyhow::Result<MemoryStore> {
    let dump: StoreDump = match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing store file {path:?}"))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreDump::new(),
        Err(e) => return Err(e).with_context(|| format!("reading store file {path:?}")),
    };
    Ok(MemoryStore::load(dump))
}

fn save_store(path: &Path, store: &MemoryStore) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(&store.dump()).context("serializing store")?;
    std::fs::write(path, json).with_context(|| format!("writing store file {path:?}"))
}

fn vote_marker(v: Option<VoteAction>) -> &'static str {
    match v {
        Some(VoteAction::Upvote) => " [upvoted]",
        Some(VoteAction::Downvote) => " [downvoted]",
        None => "",
    }
}

fn print_view(view: &RenderView) {
    if view.is_empty() {
        println!("No comments yet.");
        return;
    }
    for c in &view.comments {
        let time = c
            .comment
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| String::from("pending"));
        println!(
            "{} {} ({time}) {:+} [+{}/-{}]{}{}",
            c.comment.id,
            c.comment.display_name(),
            c.score,
            c.comment.tally.votes,
            c.comment.tally.downvotes,
            vote_marker(c.my_vote),
            if c.can_delete { " [yours]" } else { "" },
        );
        for line in c.comment.text.lines() {
            println!("    {line}");
        }
        for r in &c.replies {
            let id = r
                .id
                .map(|id| id.0.to_string())
                .unwrap_or_else(|| String::from("-"));
            println!(
                "    #{} {id} {} to {}: {} [+{}/-{}]{}{}",
                r.index,
                r.username,
                r.reply_to,
                r.text,
                r.votes,
                r.downvotes,
                vote_marker(r.my_vote),
                if r.can_delete { " [yours]" } else { "" },
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = <Opt as structopt::StructOpt>::from_args();

    let store = Arc::new(load_store(&opt.store)?);
    let provider = match opt.user {
        None => StaticIdentity::signed_out(),
        Some(uid) => StaticIdentity::signed_in(Subject {
            id: SubjectId(uid),
            display_name: opt.name,
            email: None,
        }),
    };
    let identity = IdentityResolver::new(provider, FileStorage::in_dir(&opt.state_dir)?);
    let config = EngineConfig {
        store_timeout_ms: opt.timeout_ms,
        reply_append: match opt.atomic_replies {
            true => ReplyAppend::ArrayUnion,
            false => ReplyAppend::Rewrite,
        },
        ..EngineConfig::default()
    };
    let (engine, mut feed) = CommentEngine::init(store.clone(), identity, config).await?;
    engine.set_sort_mode(opt.sort);

    match opt.cmd {
        Command::List => (),
        Command::Post { text, label } => {
            let id = engine.post_comment(&text, label.as_deref()).await?;
            println!("Posted comment {id}");
        }
        Command::Reply {
            comment,
            text,
            to,
            label,
        } => {
            let id = engine
                .post_reply(&DocId(comment), to, &text, label.as_deref())
                .await?;
            println!("Posted reply {}", id.0);
        }
        Command::Vote {
            comment,
            action,
            reply,
        } => {
            let outcome = engine.vote(&DocId(comment), reply, action).await?;
            println!("Vote: {outcome:?}");
        }
        Command::Delete {
            comment,
            reply: None,
        } => {
            engine.delete_comment(&DocId(comment)).await?;
            println!("Deleted comment");
        }
        Command::Delete {
            comment,
            reply: Some(reply),
        } => {
            let removed = engine.delete_reply(&DocId(comment), reply).await?;
            println!("Deleted reply by {}", removed.display_name());
        }
    }

    feed.drain(&engine);
    print_view(&engine.view());
    save_store(&opt.store, &store)?;

    Ok(())
}
