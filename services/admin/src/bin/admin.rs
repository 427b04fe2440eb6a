//! services/admin/src/bin/admin.rs

use admin_lib::{
    app::{resources, AppState, DashboardOverview, RemoteCollection},
    config::Config,
    error::AdminError,
};
use clap::{Parser, Subcommand, ValueEnum};
use coaching_admin_core::{
    resource::Resource,
    view::{ListQuery, SortOrder, StatusFilter, COURSES_PER_PAGE, DEFAULT_PER_PAGE, USERS_PER_PAGE},
    RecordId,
};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "admin", about = "Administration console for the coaching platform")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and remember the session.
    Login {
        #[arg(short, long)]
        username: String,
        /// Visible to other local users; prefer ADMIN_PASSWORD or the prompt.
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Sign out and forget the stored tokens.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Show dashboard figures.
    Overview,
    /// List records of one type.
    List {
        resource: ResourceKind,
        #[arg(long, default_value = "")]
        search: String,
        /// all, active or inactive
        #[arg(long, default_value = "all")]
        status: StatusFilter,
        /// Course name for lessons, lesson title for media, category for courses.
        #[arg(long)]
        parent: Option<String>,
        /// server, newest, oldest or name
        #[arg(long, default_value = "server")]
        sort: SortOrder,
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// 0 lists everything.
        #[arg(long)]
        per_page: Option<usize>,
    },
    /// Delete one record.
    Delete { resource: ResourceKind, id: RecordId },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResourceKind {
    Users,
    Courses,
    Lessons,
    Media,
    Categories,
    Departments,
    Roles,
}

impl ResourceKind {
    fn per_page(self) -> usize {
        match self {
            ResourceKind::Users => USERS_PER_PAGE,
            ResourceKind::Courses => COURSES_PER_PAGE,
            _ => DEFAULT_PER_PAGE,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AdminError> {
    let cli = Cli::parse();

    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // --- 2. Build the Shared AppState ---
    let state = AppState::from_config(config)?;
    let watcher = state.session.watch_unauthorized();

    if let Command::Login { username, password } = &cli.command {
        let password = resolve_password(
            password.clone(),
            std::env::var("ADMIN_PASSWORD").ok(),
            std::io::stdin().lock(),
        )?;
        let response = state.session.login(username, &password).await?;
        println!("Logged in as {}", response.user.display_name());
        watcher.abort();
        return Ok(());
    }

    // --- 3. Restore the Stored Session ---
    state.session.restore_session().await;
    let result = run(&state, cli.command).await;
    watcher.abort();
    result
}

/// Picks the password from the flag, then the environment, then one line of
/// `input` after a prompt on stderr.
fn resolve_password(
    flag: Option<String>,
    env: Option<String>,
    mut input: impl BufRead,
) -> Result<String, AdminError> {
    if let Some(password) = flag.or(env).filter(|p| !p.is_empty()) {
        return Ok(password);
    }
    eprint!("Password: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn run(state: &AppState, command: Command) -> Result<(), AdminError> {
    if matches!(command, Command::Logout) {
        state.session.logout().await;
        println!("Logged out");
        return Ok(());
    }

    let Some(user) = state.session.current_user() else {
        return Err(AdminError::Internal(
            "Not logged in. Run `admin login` first.".to_string(),
        ));
    };
    info!(user = %user.username, "Session active");

    match command {
        Command::Whoami => {
            println!("{} ({})", user.display_name(), user.username);
            println!("  email: {}", user.email);
            if let Some(role) = user.role_label() {
                println!("  role:  {}", role);
            }
            if let Some(department) = &user.department {
                println!("  department: {}", department);
            }
        }
        Command::Overview => {
            let overview = DashboardOverview::load(&state.api).await?;
            println!(
                "users: {} ({} active, {} inactive, {} admins)",
                overview.users,
                overview.user_stats.active,
                overview.user_stats.inactive,
                overview.user_stats.admins
            );
            println!("courses: {}", overview.courses);
            println!("lessons: {}", overview.lessons);
            for course in &overview.recent_courses {
                println!("  new: {}", course.title);
            }
        }
        Command::List {
            resource,
            search,
            status,
            parent,
            sort,
            page,
            per_page,
        } => {
            let mut query = ListQuery::new()
                .search(search)
                .status(status)
                .sort(sort)
                .page(page)
                .per_page(per_page.unwrap_or_else(|| resource.per_page()));
            if let Some(parent) = parent {
                query = query.parent(parent);
            }

            let api = &state.api;
            match resource {
                ResourceKind::Users => list(resources::users(api), &query).await?,
                ResourceKind::Courses => list(resources::courses(api), &query).await?,
                ResourceKind::Lessons => list(resources::lessons(api), &query).await?,
                ResourceKind::Media => list(resources::media_files(api), &query).await?,
                ResourceKind::Categories => list(resources::categories(api), &query).await?,
                ResourceKind::Departments => list(resources::departments(api), &query).await?,
                ResourceKind::Roles => list(resources::roles(api), &query).await?,
            }
        }
        Command::Delete { resource, id } => {
            let api = &state.api;
            match resource {
                ResourceKind::Users => resources::users(api).delete(id).await?,
                ResourceKind::Courses => resources::courses(api).delete(id).await?,
                ResourceKind::Lessons => resources::lessons(api).delete(id).await?,
                ResourceKind::Media => resources::media_files(api).delete(id).await?,
                ResourceKind::Categories => resources::categories(api).delete(id).await?,
                ResourceKind::Departments => resources::departments(api).delete(id).await?,
                ResourceKind::Roles => resources::roles(api).delete(id).await?,
            }
            println!("Deleted {}", id);
        }
        Command::Login { .. } | Command::Logout => {}
    }
    Ok(())
}

async fn list<R: Resource>(collection: RemoteCollection<R>, query: &ListQuery) -> Result<(), AdminError> {
    collection.fetch_all().await?;
    let page = collection.view(query);

    for record in &page.items {
        match record.parent_name() {
            Some(parent) => println!("{:>6}  {}  [{}]", record.id(), record.display_name(), parent),
            None => println!("{:>6}  {}", record.id(), record.display_name()),
        }
    }
    println!(
        "{} {} (page {} of {})",
        page.total,
        R::PLURAL,
        page.page,
        page.total_pages.max(1)
    );
    Ok(())
}
