use timesift_worker::core::WorkerApp;

#[tokio::main]
async fn main() {
    if let Err(e) = WorkerApp::run().await {
        eprintln!("\nError: {}\n", e);
        std::process::exit(1);
    }
}
