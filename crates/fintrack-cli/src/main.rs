//! FinTrack CLI - log in to a FinTrack backend, check the stored session, and
//! look at transactions and budgets.
//!
//! Tokens are kept between runs in the configured token store, so `open`
//! behaves like navigating to a protected view in the web client: it either
//! renders the view or redirects to the login view.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fintrack_core::auth::{claims, open_store, AuthService, Navigation, SessionGuard, SessionState, TokenStore};
use fintrack_core::models::{DateRange, EntryKind, Money, NewTransaction, NewUser, TransactionFilter};
use fintrack_core::{ApiClient, ApiError, Config, FinanceService};

/// Log file name inside the cache directory
const LOG_FILE: &str = "fintrack.log";

/// Exit code when the guard redirects to login
const EXIT_REDIRECT: u8 = 2;

const USAGE: &str = "\
Usage: fintrack <command>

Commands:
  login [email]   Log in and store the session tokens
  register        Create an account and log in
  logout          Forget the stored tokens
  open <view>     Run the session check for a protected view
  profile         Show the logged-in user's profile
  whoami          Show the claims of the stored access token
  transactions [income|expense]
                  List transactions, newest first
  add <income|expense> <amount> <merchant> [YYYY-MM-DD]
                  Record a transaction (date defaults to today)
  stats           Income, expenses and balance
  categories      List your categories
  budgets         List budgets and how much of each is used";

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` controls the level (default `warn`). Logs go to stderr and,
/// when the cache directory is available, to a log file there.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) if std::fs::create_dir_all(dir).is_ok() => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = init_tracing(config.cache_dir().ok().as_deref());

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(config, &args).await {
        Ok(code) => code,
        Err(e) => {
            if e.downcast_ref::<ApiError>().is_some_and(ApiError::is_unauthorized) {
                eprintln!("Not logged in. Run `fintrack login` first.");
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(mut config: Config, args: &[String]) -> Result<ExitCode> {
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::FAILURE);
    };

    let store = open_store(&config)?;
    let client = ApiClient::from_config(&config)?;
    info!(command = %command, base_url = %config.base_url(), "Running command");

    match command.as_str() {
        "login" => {
            let email = match args.get(1) {
                Some(email) => email.clone(),
                None => prompt_with_default("Email", config.last_email.as_deref())?,
            };
            let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

            let service = AuthService::new(client, store, config.storage_keys.clone());
            let user = service.login(&email, &password).await?;
            match user {
                Some(user) => println!("Logged in as {} ({})", user.username, user.email),
                None => println!("Logged in as {}", email),
            }

            config.last_email = Some(email);
            config.save()?;
        }
        "register" => {
            let email = prompt("Email")?;
            let username = prompt("Username")?;
            let first_name = prompt("First name (optional)")?;
            let last_name = prompt("Last name (optional)")?;
            let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
            let confirm = rpassword::prompt_password("Confirm password: ").context("Failed to read password")?;
            if password != confirm {
                anyhow::bail!("Passwords do not match");
            }

            let user = NewUser {
                email: email.clone(),
                username,
                password,
                first_name: Some(first_name).filter(|s| !s.is_empty()),
                last_name: Some(last_name).filter(|s| !s.is_empty()),
            };
            let service = AuthService::new(client, store, config.storage_keys.clone());
            service.register(&user).await?;
            println!("Account created for {}", user.username);

            config.last_email = Some(email);
            config.save()?;
        }
        "logout" => {
            AuthService::new(client, store, config.storage_keys.clone()).logout()?;
            println!("Logged out");
        }
        "open" => {
            let view = args.get(1).map(String::as_str).unwrap_or("/home");
            let guard = Arc::new(SessionGuard::from_config(&config, store, Arc::new(client)));
            let mut mount = guard.mount(view);
            if matches!(mount.navigation(), Navigation::Loading) {
                eprintln!("Loading {}...", mount.view());
            }
            if mount.resolved().await == SessionState::Unauthorized {
                println!("redirect {}", guard.login_path());
                return Ok(ExitCode::from(EXIT_REDIRECT));
            }
            println!("render {}", mount.view());
        }
        "profile" => {
            let service = AuthService::new(client, store, config.storage_keys.clone());
            let profile = service.profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        "whoami" => whoami(&config, store.as_ref())?,
        "transactions" => {
            let kind = args.get(1).map(|k| parse_kind(k)).transpose()?;
            let finance = FinanceService::new(client, store, config.storage_keys.clone());
            let filter = TransactionFilter {
                kind,
                ..TransactionFilter::default()
            };
            for tx in finance.transactions(&filter).await? {
                println!("{:>6}  {}  {:>12}  {}", tx.id, tx.date, tx.signed_amount(), tx.merchant);
            }
        }
        "add" => {
            let (Some(kind), Some(amount), Some(merchant)) = (args.get(1), args.get(2), args.get(3)) else {
                eprintln!("{}", USAGE);
                return Ok(ExitCode::FAILURE);
            };
            let date = match args.get(4) {
                Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d").context("Date must be YYYY-MM-DD")?,
                None => Local::now().date_naive(),
            };
            let amount = amount.parse::<Money>()?;
            if !amount.is_positive() {
                anyhow::bail!("Amount must be greater than zero");
            }
            let transaction = NewTransaction {
                amount,
                date,
                merchant: merchant.clone(),
                category: None,
                kind: parse_kind(kind)?,
                notes: None,
            };
            let finance = FinanceService::new(client, store, config.storage_keys.clone());
            let created = finance.add_transaction(&transaction).await?;
            println!("Recorded #{} ({} {})", created.id, created.kind, created.amount);
        }
        "stats" => {
            let finance = FinanceService::new(client, store, config.storage_keys.clone());
            let stats = finance.stats(&DateRange::default()).await?;
            println!("income:       {}", stats.total_income);
            println!("expenses:     {}", stats.total_expenses);
            println!("balance:      {}", stats.balance);
            println!("transactions: {}", stats.transaction_count);
        }
        "categories" => {
            let finance = FinanceService::new(client, store, config.storage_keys.clone());
            for category in finance.categories().await? {
                println!("{:>6}  {:<8}  {}", category.id, category.kind, category.label());
            }
        }
        "budgets" => {
            let finance = FinanceService::new(client, store, config.storage_keys.clone());
            for budget in finance.budgets().await? {
                let name = budget
                    .category_detail
                    .as_ref()
                    .map(|c| c.label())
                    .unwrap_or_else(|| format!("category {}", budget.category_id().unwrap_or_default()));
                let used = budget
                    .percentage_used
                    .map(|pct| format!("{:.0}%", pct))
                    .unwrap_or_else(|| "-".to_string());
                let flag = if budget.is_over() { "  over" } else { "" };
                println!(
                    "{:>6}  {}  {:>12}  {:>5}  {} .. {}{}",
                    budget.id, name, budget.amount, used, budget.start_date, budget.end_date, flag
                );
            }
        }
        "-h" | "--help" | "help" => println!("{}", USAGE),
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            return Ok(ExitCode::FAILURE);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Print the unverified claims of the stored access token
fn whoami(config: &Config, store: &dyn TokenStore) -> Result<()> {
    let Some(token) = store.get(&config.storage_keys.access)? else {
        println!("No access token stored");
        return Ok(());
    };

    let claims = claims::decode_claims(&token)?;
    let now = Utc::now();
    if let Some(user_id) = &claims.user_id {
        println!("user id:    {}", user_id);
    }
    println!("staff:      {}", claims.is_staff);
    println!("superuser:  {}", claims.is_superuser);
    if let Some(expires_at) = claims.expires_at() {
        println!("expires at: {}", expires_at.to_rfc3339());
    }
    if claims.is_expired_at(now) {
        println!("status:     expired (will renew on next `open`)");
    } else {
        println!("status:     valid for {}s", claims.seconds_remaining(now));
    }
    Ok(())
}

fn parse_kind(value: &str) -> Result<EntryKind> {
    match value {
        "income" => Ok(EntryKind::Income),
        "expense" => Ok(EntryKind::Expense),
        other => anyhow::bail!("Expected `income` or `expense`, got `{}`", other),
    }
}

fn prompt(label: &str) -> Result<String> {
    prompt_with_default(label, None)
}

fn prompt_with_default(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(default) => print!("{} [{}]: ", label, default),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim();
    Ok(match (value.is_empty(), default) {
        (true, Some(default)) => default.to_string(),
        _ => value.to_string(),
    })
}
