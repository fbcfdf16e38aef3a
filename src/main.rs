use hello_telemetry::{handler::handle_with_telemetry, state::AppState};
use lambda_runtime::{run, service_fn, tracing, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let state = &AppState::new();
    run(service_fn(move |event| async move {
        handle_with_telemetry(state, event).await
    }))
    .await
}
