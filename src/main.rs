fn main() {
    if let Err(err) = planboard::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
