use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    chunked_features::apps::run_rebuild_store(std::env::args().skip(1))
}
