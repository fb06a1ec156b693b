//! scriber - Scribe to fan-out queue bridge

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scriber_runtime::run().await
}
