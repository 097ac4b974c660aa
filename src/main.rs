fn main() {
    if let Err(err) = tablestat::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
