use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use updates_client::cache::{FetchStatus, PaginatedCollection};
use updates_client::config::parse_api_url;
use updates_client::model::{Comment, Post};
use updates_client::{App, AuthOutcome, ClientConfig, FeedKey, PostId, ThemePreference};

#[derive(Parser)]
#[command(name = "updates", version, about = "Terminal client for the Updates news feed")]
struct Cli {
    /// API base URL (defaults to UPDATES_API_URL or the hosted service)
    #[arg(long)]
    api_url: Option<String>,
    /// Directory for the session token and preferences
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Login {
        username: String,
        email: String,
        #[arg(long, env = "UPDATES_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Signup {
        username: String,
        email: String,
        #[arg(long, env = "UPDATES_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    Whoami,
    /// Latest posts
    Feed {
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    Post {
        id: String,
    },
    Comments {
        id: String,
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Post a comment (requires login)
    Comment {
        id: String,
        content: String,
    },
    /// Show or change the theme preference
    Theme {
        value: Option<ThemePreference>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("updates=info,updates_client=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &cli.api_url {
        config.api_url = parse_api_url(url)?;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let app = App::init(&config).await?;

    match cli.command {
        Command::Login {
            username,
            email,
            password,
        } => Ok(report(app.session.login(&username, &email, &password).await)),
        Command::Signup {
            username,
            email,
            password,
        } => Ok(report(app.session.sign_up(&username, &email, &password).await)),
        Command::Logout => {
            app.session.logout().await;
            println!("Signed out");
            Ok(true)
        }
        Command::Whoami => {
            app.session.refresh_user().await;
            match app.session.user() {
                Some(user) => {
                    println!("{} (@{}) {:?}", user.display_name, user.username, user.role);
                    if !app.session.session().token_persisted {
                        println!("warning: session was not saved and will not survive a restart");
                    }
                }
                None => println!("Not signed in"),
            }
            Ok(true)
        }
        Command::Feed { pages } => {
            let mut feed = app.feed.get_or_create(&FeedKey).await;
            for _ in 1..pages {
                if !feed.has_next_page() {
                    break;
                }
                if let Some(next) = app.feed.fetch_next(&FeedKey).await {
                    feed = next;
                }
            }
            feed.items.iter().for_each(print_post);
            Ok(report_status(&feed, "No posts yet."))
        }
        Command::Post { id } => {
            let state = app.posts.get_or_fetch(&PostId::new(id)).await;
            match state.value {
                Some(post) => {
                    print_post(&post);
                    if let Some(content) = &post.content {
                        println!("\n{content}");
                    }
                    Ok(true)
                }
                None => {
                    eprintln!("{}", state.error.as_deref().unwrap_or("Post not found"));
                    Ok(false)
                }
            }
        }
        Command::Comments { id, pages } => {
            let post = PostId::new(id);
            let mut thread = app.comments.get_or_create(&post).await;
            for _ in 1..pages {
                if !thread.has_next_page() {
                    break;
                }
                if let Some(next) = app.comments.fetch_next(&post).await {
                    thread = next;
                }
            }
            if thread.has_next_page() {
                println!("(older comments available)");
            }
            thread.items.iter().for_each(print_comment);
            Ok(report_status(&thread, "No comments yet."))
        }
        Command::Comment { id, content } => {
            let post = PostId::new(id);
            match app.comment_service.submit(&post, &content).await {
                Ok(comment) => {
                    println!("Posted:");
                    print_comment(&comment);
                    Ok(true)
                }
                Err(e) => {
                    eprintln!("{}", e.user_message());
                    Ok(false)
                }
            }
        }
        Command::Theme { value } => {
            if let Some(theme) = value {
                app.theme.set(theme).await;
            }
            println!("{}", app.theme.theme());
            Ok(true)
        }
    }
}

fn report(outcome: AuthOutcome) -> bool {
    match outcome {
        AuthOutcome::Authenticated(user) => {
            println!("Signed in as {}", user.display_name);
            true
        }
        AuthOutcome::Rejected(msg) => {
            eprintln!("{msg}");
            false
        }
    }
}

fn report_status<T>(collection: &PaginatedCollection<T>, empty: &str) -> bool {
    match collection.status {
        FetchStatus::Error => {
            eprintln!(
                "{}",
                collection.error.as_deref().unwrap_or("Failed to load.")
            );
            false
        }
        _ => {
            if collection.items.is_empty() {
                println!("{empty}");
            }
            true
        }
    }
}

fn print_post(post: &Post) {
    println!(
        "[{}] {}  ({})\n    by {} {} | {} comments, {} likes",
        post.category_label(),
        post.title,
        post.id,
        post.user.display_name,
        post.created_at.format("%Y-%m-%d %H:%M"),
        post.counts.comments,
        post.counts.likes,
    );
    if !post.description.is_empty() {
        println!("    {}", post.description);
    }
}

fn print_comment(comment: &Comment) {
    println!(
        "{} ({}): {}",
        comment.author_name(),
        comment.created_at.format("%Y-%m-%d %H:%M"),
        comment.content
    );
}
