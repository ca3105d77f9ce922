use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cruise_agent::cache::ReferenceCache;
use cruise_agent::ftp::control::{ControlClient, SuppaftpTransport};
use cruise_agent::ftp::{FtpConfig, Transport};
use cruise_agent::orchestrator::{Orchestrator, RunState};
use cruise_agent::{api, maintenance, Args};
use futures::FutureExt;
use sqlx::Connection;

fn main() -> Result<(), anyhow::Error> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("failed to install default crypto provider");

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let args = Args::parse();
    tracing::info!(?args, "started!");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let task = runtime.spawn(async move { async_main(args).await });
    let result = runtime.block_on(task);

    tracing::info!(?result, "main function completed, shutting down runtime");
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result?
}

async fn async_main(args: Args) -> Result<(), anyhow::Error> {
    let api_listener = tokio::net::TcpListener::bind(format!("[::]:{}", args.api_port))
        .await
        .context("failed to bind server port")?;

    let application_name = std::env::var("HOSTNAME").unwrap_or_else(|_| "cruise-agent".to_string());
    let mut pg_options = args
        .database_url
        .as_str()
        .parse::<sqlx::postgres::PgConnectOptions>()
        .context("parsing database URL")?
        .application_name(&application_name);

    if let Some(ca) = &args.database_ca {
        pg_options = pg_options
            .ssl_mode(sqlx::postgres::PgSslMode::VerifyFull)
            .ssl_root_cert(ca);
    } else {
        pg_options = pg_options.ssl_mode(sqlx::postgres::PgSslMode::Prefer);
    }

    let pg_pool = sqlx::postgres::PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(5))
        .after_release(|conn, meta| {
            let fut = async move {
                let r = tokio::time::timeout(std::time::Duration::from_secs(5), conn.ping()).await;
                match r {
                    Ok(Ok(())) => Ok(true),
                    _ => {
                        tracing::warn!(conn_meta = ?meta, "connection was put back in a bad state, removing from the pool");
                        Ok(false)
                    }
                }
            };
            fut.boxed()
        })
        .connect_with(pg_options)
        .await
        .context("connecting to database")?;

    let ftp_config = FtpConfig {
        host: args.ftp_host.clone(),
        user: args.ftp_user.clone(),
        password: args.ftp_password.clone(),
        secure: args.ftp_secure,
        verbose: args.ftp_verbose,
    };
    let transport: Box<dyn Transport> = Box::new(SuppaftpTransport::new(ftp_config.clone()));
    let control = Arc::new(ControlClient::new(ftp_config, transport));

    let cache = Arc::new(ReferenceCache::new());
    let orchestrator = Arc::new(Orchestrator {
        db: pg_pool.clone(),
        cache,
        control,
        args: args.clone(),
        run_state: Arc::new(RunState::default()),
    });

    let timezone: chrono_tz::Tz = args
        .cron_timezone
        .parse()
        .unwrap_or(chrono_tz::America::New_York);

    let scheduler = tokio_cron_scheduler::JobScheduler::new()
        .await
        .context("creating cron scheduler")?;
    maintenance::schedule(&scheduler, pg_pool.clone(), timezone)
        .await
        .context("scheduling maintenance jobs")?;

    if args.enable_scheduled_cruise_sync {
        let scheduled_orchestrator = Arc::clone(&orchestrator);
        let job = tokio_cron_scheduler::Job::new_async_tz(
            "0 0 2 * * *",
            timezone,
            move |_uuid, _l| {
                let orchestrator = Arc::clone(&scheduled_orchestrator);
                Box::pin(async move {
                    if let Err(err) = orchestrator.run_scheduled_sync().await {
                        tracing::error!(%err, "scheduled cruise sync failed");
                    }
                })
            },
        )
        .context("building scheduled sync job")?;
        scheduler.add(job).await.context("scheduling cruise sync")?;
    }

    scheduler.start().await.context("starting cron scheduler")?;

    let router = api::build_router(Arc::clone(&orchestrator));

    tracing::info!(port = args.api_port, "serving control surface API");
    axum::serve(api_listener, router)
        .await
        .context("serving API")?;

    Ok(())
}
