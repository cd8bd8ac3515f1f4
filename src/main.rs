use forward_renderer::AppSettings;

fn main() {
    forward_renderer::init_logging();
    let settings = AppSettings::load();
    if let Err(err) = forward_renderer::run(settings) {
        eprintln!("Application error: {err}");
        std::process::exit(1);
    }
}
