use std::{process, sync::Arc};

use tessera::{
    application::{
        build::{BlockBuilder, BuildConfig, BuildOrchestrator},
        context::{DocumentContext, ExtraValues, PageContext, RequestContext},
        error::AppError,
        formula::{Evaluator, FormulaConfig, FormulaScope, FormulaServices},
        page::PageService,
        render::TemplateEngine,
        repos::ContentRepository,
    },
    cache::{CacheConfig, CacheManager, Clock, MemoryDocumentStore, SystemClock},
    config::{self, Command, EvalArgs, RenderArgs, Settings},
    infra::{
        InMemoryContentRepository, LogMailer, MiniJinjaEngine, PassthroughResizer,
        error::InfraError, telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    let chain = report.messages.join(": ");
    if dispatcher::has_been_set() {
        error!(source = report.source, error = %chain, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(source = report.source, error = %chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Render(args) => run_render(&settings, args).await,
        Command::Eval(args) => run_eval(&settings, args).await,
    }
}

struct Services {
    pages: PageService,
    evaluator: Arc<Evaluator>,
}

async fn build_services(settings: &Settings) -> Result<Services, AppError> {
    let fixture = &settings.content.fixture;
    if !fixture.is_file() {
        return Err(InfraError::configuration(format!(
            "content fixture `{}` not found",
            fixture.display()
        ))
        .into());
    }

    let content: Arc<dyn ContentRepository> =
        Arc::new(InMemoryContentRepository::from_fixture_path(fixture).await?);
    let templates: Arc<dyn TemplateEngine> =
        Arc::new(MiniJinjaEngine::with_directory(&settings.content.templates)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let evaluator = Arc::new(Evaluator::new(
        FormulaConfig::from(&settings.formula),
        FormulaServices {
            content: content.clone(),
            mailer: Arc::new(LogMailer::new()),
            resizer: Arc::new(PassthroughResizer::new(settings.content.media_base.clone())),
            clock: clock.clone(),
        },
    ));

    let cache = CacheManager::new(
        CacheConfig::from(&settings.cache),
        Arc::new(MemoryDocumentStore::new()),
        clock,
    );
    let builder = BlockBuilder::new(cache, evaluator.clone(), content.clone(), templates.clone());
    let pages = PageService::new(
        content,
        templates,
        BuildOrchestrator::new(builder),
        BuildConfig::from(&settings.build),
    );

    Ok(Services { pages, evaluator })
}

async fn run_render(settings: &Settings, args: RenderArgs) -> Result<(), AppError> {
    let services = build_services(settings).await?;

    info!(
        target = "tessera::render",
        page = %args.page_id,
        strategy = %settings.build.strategy,
        repeat = args.repeat,
        "rendering page"
    );

    for _ in 0..args.repeat {
        let request = RequestContext::new(args.request.path.clone(), args.request.query.clone());
        let rendered = services
            .pages
            .render_page(&args.page_id, request, ExtraValues::new(), true)
            .await?;
        let line = serde_json::to_string(&rendered)
            .map_err(|err| AppError::unexpected(format!("failed to encode result: {err}")))?;
        println!("{line}");
    }

    Ok(())
}

async fn run_eval(settings: &Settings, args: EvalArgs) -> Result<(), AppError> {
    let services = build_services(settings).await?;

    let request = RequestContext::new(args.request.path, args.request.query);
    let document = DocumentContext::new(PageContext {
        domain: settings.build.domain.clone(),
        ..PageContext::default()
    });
    let values = ExtraValues::new();
    let scope = FormulaScope::new(&request, &document, &values);

    println!("{}", services.evaluator.evaluate(&args.expr, &scope).await);
    Ok(())
}
