mod repl;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    load_settings, normalize_database_url, Command, ControllerOptions, DurableSessionStore,
    Effect, HttpServices, RestorePolicy, Services, SessionController, SessionEvent, StateDelta,
    View,
};
use repl::{parse_line, Input, HELP};
use shared::domain::{Plan, PLAN_CATALOG, UNLIMITED_PERIOD_DAYS};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Interactive client for the PulseAI query service")]
struct Args {
    /// Config file (defaults to ./pulse.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    auth_url: Option<String>,
    #[arg(long)]
    ai_url: Option<String>,
    #[arg(long)]
    payment_url: Option<String>,
    #[arg(long)]
    profile_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// `trust` or `verify`.
    #[arg(long)]
    restore_policy: Option<RestorePolicy>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref());
    if let Some(v) = args.auth_url {
        settings.auth_url = v;
    }
    if let Some(v) = args.ai_url {
        settings.ai_url = v;
    }
    if let Some(v) = args.payment_url {
        settings.payment_url = v;
    }
    if let Some(v) = args.profile_url {
        settings.profile_url = v;
    }
    if let Some(v) = args.database_url {
        settings.database_url = v;
    }
    if let Some(v) = args.timeout {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = args.restore_policy {
        settings.restore_policy = v;
    }

    let database_url = normalize_database_url(&settings.database_url);
    let store = DurableSessionStore::open(&database_url)
        .await
        .with_context(|| format!("failed to open session store at {database_url}"))?;
    let backend = Arc::new(HttpServices::new(settings.endpoints()?));
    let controller = Arc::new(SessionController::new_with_options(
        Services::single(backend),
        Arc::new(store),
        ControllerOptions::from_settings(&settings),
    ));
    info!(auth = %settings.auth_url, database = %database_url, "client ready");

    let mut events = controller.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    print_plans();
    let delta = controller.dispatch(Command::RestoreSession).await;
    report(&controller, &delta).await;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = match parse_line(&line) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match input {
            Input::Quit => break,
            Input::Help => println!("{HELP}"),
            Input::Plans => print_plans(),
            Input::Status => print_view(&controller.view().await),
            Input::Verify { code } => {
                let View::AuthPending {
                    phone: Some(phone), ..
                } = controller.view().await
                else {
                    println!("request a code first: phone <number>");
                    continue;
                };
                let delta = controller
                    .dispatch(Command::VerifyCode { phone, code })
                    .await;
                report(&controller, &delta).await;
            }
            Input::Session(command) => {
                let delta = controller.dispatch(command).await;
                report(&controller, &delta).await;
            }
        }
    }

    Ok(())
}

fn print_plans() {
    println!("plans:");
    for plan in PLAN_CATALOG.iter() {
        println!("{}", plan_line(plan));
    }
}

fn plan_line(plan: &Plan) -> String {
    let allowance = plan.request_allowance.map_or_else(
        || format!("unlimited requests for {UNLIMITED_PERIOD_DAYS} days"),
        |n| format!("{n} requests"),
    );
    let featured = if plan.is_featured { "  (popular)" } else { "" };
    format!(
        "  {:<10} buy {:<10} {:>4}.{:02}  {allowance}{featured}",
        plan.display_name,
        plan.kind.wire_name(),
        plan.price_minor_units / 100,
        plan.price_minor_units % 100,
    )
}

async fn report(controller: &SessionController, delta: &StateDelta) {
    match &delta.effect {
        Some(Effect::Answered(answer)) => println!("> {answer}"),
        Some(Effect::SignedIn(user_id)) => println!("signed in as user {user_id}"),
        Some(Effect::Restored(Some(user_id))) => println!("welcome back, user {user_id}"),
        Some(Effect::SignInRequired) => println!("sign in first: phone <number>"),
        Some(Effect::LoggedOut) => println!("signed out"),
        _ => {}
    }
    if let Some(err) = &delta.error {
        println!("error ({:?}): {err}", err.kind());
    }
    if delta.before != delta.after || delta.effect == Some(Effect::ProfileLoaded) {
        print_view(&controller.view().await);
    }
}

fn print_view(view: &View) {
    match view {
        View::Landing => println!("[plans] choose a plan or type start"),
        View::AuthPending { code_sent, phone } => match (*code_sent, phone) {
            (true, Some(phone)) => println!("[sign-in] code sent to {phone}; type code <digits>"),
            _ => println!("[sign-in] type phone <number>"),
        },
        View::Authenticated { quota, exchange } => {
            let plan = quota
                .active_plan
                .map_or_else(|| "free".to_string(), |plan| plan.to_string());
            println!("[assistant] plan {plan}, {} requests left", quota.free_remaining);
            if let Some(exchange) = exchange {
                println!("  last question: {} ({:?})", exchange.question, exchange.status);
            }
        }
        View::Profile { snapshot, loading } => {
            if *loading {
                println!("[profile] loading...");
            }
            match snapshot.as_ref().map(serde_json::to_string_pretty) {
                Some(Ok(json)) => println!("[profile]\n{json}"),
                Some(Err(err)) => warn!("could not render profile: {err}"),
                None => {}
            }
        }
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::CodeIssued { code } => println!("(demo) your code is {code}"),
        SessionEvent::PaymentRedirect { plan, url } => {
            println!("open this link to pay for {plan}: {url}");
        }
        SessionEvent::ViewChanged { .. }
        | SessionEvent::Answered { .. }
        | SessionEvent::Notice { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::PlanKind;

    #[test]
    fn plan_rows_show_name_purchase_keyword_and_price() {
        let pro = plan_line(PlanKind::Pro.plan());
        assert!(pro.contains("Pro"));
        assert!(pro.contains("buy pro"));
        assert!(pro.contains("399.00"));
        assert!(pro.contains("30 requests"));
        assert!(pro.ends_with("(popular)"));
    }

    #[test]
    fn unlimited_row_states_its_period() {
        let unlimited = plan_line(PlanKind::Unlimited.plan());
        assert!(unlimited.contains("unlimited requests for 30 days"));
        assert!(unlimited.contains("499.00"));
    }
}
