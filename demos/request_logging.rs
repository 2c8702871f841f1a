use std::sync::Arc;

use tokio::time::{sleep, Duration};

use correlated_json_log::correlation::EnvCorrelation;
use correlated_json_log::formatter::JsonFormatter;
use correlated_json_log::middleware::{handler_fn, BoxError, Request, RequestLogger, Response};
use correlated_json_log::sink::LogSink;
use correlated_json_log::writer_sink::JsonLineSink;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // `DD_ENV`, `DD_SERVICE` and `DD_VERSION` end up in every line's `dd`.
    let formatter = JsonFormatter::new(Arc::new(EnvCorrelation::from_env()));
    let sink = Arc::new(JsonLineSink::stdout(formatter).with_progname("demo"));

    let handler = handler_fn(|request: Request| async move {
        match request.path.as_str() {
            "/slow" => {
                sleep(Duration::from_millis(30)).await;
                Ok(Response::new(200).with_header("Content-Type", "text/plain"))
            }
            "/boom" => Err::<Response, BoxError>("upstream exploded".into()),
            _ => Ok(Response::new(200)
                .with_header("Content-Type", "application/json")
                .with_body(r#"{"message":"OK"}"#)),
        }
    });
    let logger = RequestLogger::new(handler, sink.clone());

    for target in ["/orders?page=2&page=3", "/slow", "/boom"] {
        let request = Request::get(target).with_remote_addr("127.0.0.1");
        let response = logger.handle(&request).await?;
        eprintln!("{} -> {}", target, response.status);
    }

    sink.flush().await
}
