use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    chunked_features::apps::run_inspect_store(std::env::args().skip(1))
}
