fn main() {
    // 捕获 panic 并显示在控制台
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("proxyhub: fatal error");
        eprintln!("{panic_info}");
    }));

    if let Err(e) = app_lib::run() {
        eprintln!("proxyhub failed: {e:#}");
        std::process::exit(1);
    }
}
