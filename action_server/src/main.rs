#[tokio::main]
async fn main() -> std::io::Result<()> {
    action_server::run_with_config().await
}
