use std::{process, sync::Arc};

use pdf_renderer::{
    application::{
        error::AppError,
        pipeline::{Pipeline, PipelineConfig, PipelineError},
    },
    config,
    infra::{
        artifacts::ArtifactStore,
        error::InfraError,
        http::{self, HttpState},
        pdf::PdfRenderer,
        telemetry::{self, MetricsObservability},
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let pipeline = build_pipeline(&settings);

    match command {
        config::Command::Serve(_) => run_serve(settings, pipeline).await,
        config::Command::Render(args) => run_render(pipeline, args).await,
    }
}

fn build_pipeline(settings: &config::Settings) -> Pipeline {
    Pipeline::new(
        PipelineConfig::from(settings),
        ArtifactStore::new(&settings.artifacts.directory),
        Arc::new(MetricsObservability),
        Arc::new(PdfRenderer),
    )
}

async fn run_serve(settings: config::Settings, pipeline: Pipeline) -> Result<(), AppError> {
    let router = http::build_router(HttpState {
        pipeline: Arc::new(pipeline),
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        artifacts = %settings.artifacts.directory.display(),
        validate_payloads = settings.pipeline.validate_payloads,
        max_body_bytes = settings.pipeline.max_body_bytes,
        "starting pdf renderer"
    );

    http::serve_with_shutdown(listener, router, shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn run_render(pipeline: Pipeline, args: config::RenderArgs) -> Result<(), AppError> {
    let body = tokio::fs::read(&args.input).await.map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to read `{}`: {err}",
            args.input.display()
        )))
    })?;

    pipeline
        .render_offline(&body, &args.output)
        .await
        .map_err(|err| match &err {
            PipelineError::Validation(_) | PipelineError::Build(_) => {
                AppError::validation(err.public_body())
            }
            _ => AppError::from(err),
        })?;

    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        "rendered document"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
