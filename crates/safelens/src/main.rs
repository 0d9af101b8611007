#[tokio::main]
async fn main() -> std::process::ExitCode {
    safelens::start(std::env::args()).await
}
