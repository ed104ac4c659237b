#[tokio::main]
async fn main() {
    if let Err(e) = vocal_reminders::run().await {
        eprintln!("vocal-reminders: {e}");
        std::process::exit(1);
    }
}
