fn main() {
    if let Err(e) = caseiter::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
