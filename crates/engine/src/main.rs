//! Wayfarer Engine - persistent multi-tenant world simulation.
//!
//! The binary is a thin shell: the composition root assembles adapters and
//! the run module drives the process lifecycle.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wayfarer_engine::run::run().await
}
