use cloudpipe_core::step::{Step, StepDefinition, StepResponse};
use cloudpipe_lambda::handlers::copy::{handle_copy_event, CopyHandlerConfig};
use cloudpipe_lambda::handlers::split_lines::{handle_split_lines_event, split_lines_definition};
use cloudpipe_lambda::runtime::{build_step, init_tracing, StorageLocation};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

const STEP_KIND_ENV: &str = "CLOUDPIPE_STEP";
const BUCKET_LOCATION_ENV: &str = "CLOUDPIPE_BUCKET_ENV";
const DEFAULT_BUCKET_LOCATION: &str = "CLOUDPIPE_BUCKET";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    Copy,
    SplitLines,
}

impl StepKind {
    fn from_env() -> Result<Self, Error> {
        let raw = std::env::var(STEP_KIND_ENV).unwrap_or_else(|_| "copy".to_string());
        match raw.trim().to_ascii_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "split_lines" | "split-lines" => Ok(Self::SplitLines),
            other => Err(Error::from(format!(
                "unsupported {STEP_KIND_ENV} '{other}' (expected copy or split_lines)"
            ))),
        }
    }

    fn definition(self) -> StepDefinition {
        match self {
            Self::Copy => {
                CopyHandlerConfig::from_lookup(|name| std::env::var(name).ok()).definition()
            }
            Self::SplitLines => split_lines_definition(),
        }
    }
}

struct RuntimeDependencies {
    kind: StepKind,
    step: Step,
    definition: StepDefinition,
}

async fn handle_request(
    event: LambdaEvent<Value>,
    deps: &RuntimeDependencies,
) -> Result<StepResponse, Error> {
    let request_id = event.context.request_id.clone();
    let result = match deps.kind {
        StepKind::Copy => handle_copy_event(&deps.step, &deps.definition, event.payload),
        StepKind::SplitLines => {
            handle_split_lines_event(&deps.step, &deps.definition, event.payload)
        }
    };

    result.map_err(|error| {
        tracing::error!(
            component = "step_runtime",
            request_id = %request_id,
            error = %error,
            "step failed"
        );
        Error::from(error)
    })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let kind = StepKind::from_env()?;
    let location = StorageLocation::s3(
        std::env::var(BUCKET_LOCATION_ENV).unwrap_or_else(|_| DEFAULT_BUCKET_LOCATION.to_string()),
    );
    let definition = kind.definition();
    definition.spec().validate()?;

    let deps = RuntimeDependencies {
        kind,
        step: build_step(&location).await,
        definition,
    };
    tracing::info!(component = "step_runtime", step = ?deps.kind, "runtime ready");

    lambda_runtime::run(service_fn(|event| handle_request(event, &deps))).await
}
