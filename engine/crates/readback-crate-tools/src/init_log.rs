use std::io::Write;

/// 安装全局 logger
///
/// 可以重复调用：测试里每个 case 都会调一次，只有第一次生效。
pub fn init_log(filter: log::LevelFilter) {
    let result = env_logger::Builder::new()
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let warn_style = buf
                .default_level_style(log::Level::Warn)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
            let error_style = buf
                .default_level_style(log::Level::Error)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => warn_style,
                log::Level::Error => error_style,
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

            // 渲染线程和控制线程的日志混在一起，带上线程名方便区分
            let thread = std::thread::current();
            let thread_name = thread.name().unwrap_or("unnamed");
            let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
            let line = record.line().unwrap_or(0);
            let time = chrono::Local::now().format("%H:%M:%S%.3f");

            writeln!(
                buf,
                "{level_style}[{time}] {:<5}{level_style:#} {grey_style}[{thread_name}] [{file}:{line}]{grey_style:#} {}",
                record.level(),
                record.args()
            )
        })
        .filter(None, filter)
        .parse_env("RUST_LOG")
        .is_test(cfg!(test))
        .try_init();

    if result.is_err() {
        log::debug!("logger already initialized");
    }
}
