#[tokio::main]
async fn main() {
    grievance_server::start_server().await;
}
