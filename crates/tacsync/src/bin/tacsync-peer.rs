#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tacsync::peer::run().await
}
