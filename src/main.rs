use carwash_pos_lib::{run, Mode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let arg = std::env::args().nth(1);
    let mode = Mode::from_arg(arg.as_deref())?;
    run(mode).await
}
