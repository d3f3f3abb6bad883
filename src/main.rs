use clap::Parser;
use epubfix::config::DEFAULT_CONFIG_PATH;
use epubfix::{
    AcceptDefault, BatchInput, BatchResult, FixedLanguage, LanguageResolver, Outcome, RepairConfig,
    Repairer, Result, prompt,
};
use std::fs;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// 🔧 epubfix - EPUB修复工具
#[derive(Parser)]
#[command(name = "epubfix")]
#[command(about = "修复不合规的EPUB文件，使其能被电子书商店接受")]
#[command(version)]
struct Args {
    /// EPUB文件路径
    #[arg(required = true, help = "要修复的EPUB文件路径")]
    files: Vec<PathBuf>,

    /// 输出目录
    #[arg(short, long, help = "输出目录（默认与输入文件放在一起）")]
    output_dir: Option<PathBuf>,

    /// 保留原文件名
    #[arg(short, long, help = "输出文件不添加 (fixed) / (repacked) 前缀")]
    keep_original_filename: bool,

    /// 额外输出合集压缩包
    #[arg(short, long, help = "把所有成功的输出打包成一个压缩包")]
    bundle: bool,

    /// 配置文件路径
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, help = "YAML配置文件路径")]
    config: PathBuf,

    /// 配置文件不存在时写出默认配置
    #[arg(long, help = "配置文件不存在时创建默认配置文件")]
    write_config: bool,

    /// 统一使用的语言
    #[arg(short, long, help = "所有语言询问都使用此语言代码")]
    language: Option<String>,

    /// 不询问，直接采用默认值
    #[arg(long, conflicts_with = "language", help = "所有语言询问都采用默认值")]
    no_prompt: bool,

    /// 详细输出模式
    #[arg(short, long, help = "显示调试信息")]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    println!("🔧 epubfix - EPUB修复工具");

    match run(&args) {
        Ok(true) => println!("🎉 处理完成！"),
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("❌ 错误: {}", e);
            process::exit(1);
        }
    }
}

/// 诊断信息写到stderr，RUST_LOG优先
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// 处理所有输入文件
///
/// # 返回值
/// * `Result<bool>` - 至少有一本书成功时为true
fn run(args: &Args) -> Result<bool> {
    let mut config = load_config(args)?;
    if args.keep_original_filename {
        config.keep_original_filename = true;
    }
    if let Some(directory) = &args.output_dir {
        fs::create_dir_all(directory)?;
    }

    let mut sources = Vec::new();
    let mut inputs = Vec::new();
    let mut failures = 0;
    for path in &args.files {
        match fs::read(path) {
            Ok(bytes) => {
                sources.push(path.clone());
                inputs.push(BatchInput::new(display_name(path), bytes));
            }
            Err(e) => {
                println!("\n📖 {}", path.display());
                println!("  ❌ 无法读取文件: {}", e);
                failures += 1;
            }
        }
    }

    println!("正在修复 {} 个EPUB文件...", inputs.len());
    let results = repair_all(args, &config, inputs);

    let mut successes = 0;
    for (source, result) in sources.iter().zip(&results) {
        if report(args, &config, source, result) {
            successes += 1;
        } else {
            failures += 1;
        }
    }

    if args.bundle && successes > 0 {
        let bytes = epubfix::bundle(&results, &config)?;
        let path = args
            .output_dir
            .clone()
            .unwrap_or_default()
            .join(&config.bundle_name);
        fs::write(&path, bytes)?;
        println!("\n📦 合集已保存: {}", path.display());
    }

    println!("\n📊 成功 {} 个，失败 {} 个", successes, failures);
    Ok(successes > 0)
}

fn load_config(args: &Args) -> Result<RepairConfig> {
    if args.write_config {
        RepairConfig::load_or_create(&args.config)
    } else if args.config.exists() {
        RepairConfig::load_from_file(&args.config)
    } else {
        Ok(RepairConfig::default())
    }
}

/// 按选项选择语言询问方式并执行批量修复
fn repair_all(args: &Args, config: &RepairConfig, inputs: Vec<BatchInput>) -> Vec<BatchResult> {
    if let Some(language) = &args.language {
        return run_batch(config, &FixedLanguage(language.clone()), &inputs);
    }
    if args.no_prompt {
        return run_batch(config, &AcceptDefault, &inputs);
    }

    // 终端留在主线程回答询问，修复在工作线程中进行
    let (resolver, requests) = prompt::channel(None);
    thread::scope(|scope| {
        let worker = scope.spawn(move || run_batch(config, &resolver, &inputs));

        let stdin = io::stdin();
        if let Err(e) = prompt::serve(&requests, stdin.lock(), io::stdout()) {
            warn!("无法继续询问语言，剩余询问采用默认值: {}", e);
        }
        drop(requests);

        worker
            .join()
            .unwrap_or_else(|payload| panic::resume_unwind(payload))
    })
}

fn run_batch(config: &RepairConfig, resolver: &dyn LanguageResolver, inputs: &[BatchInput]) -> Vec<BatchResult> {
    let repairer = Repairer::new(config, resolver);
    epubfix::repair_batch(&repairer, inputs)
}

/// 打印单本书的结果并写出修复后的文件，返回是否成功
fn report(args: &Args, config: &RepairConfig, source: &Path, result: &BatchResult) -> bool {
    println!("\n📖 {}", result.name);

    match result.outcome() {
        Outcome::Fixed(fixes) => {
            println!("  ✅ 应用了 {} 项修复:", fixes.len());
            for fix in &fixes {
                println!("    - {}", fix);
            }
        }
        Outcome::NoFixesNeeded => println!("  ✨ 无需修复，已重新打包"),
        Outcome::Failed(message) => {
            println!("  ❌ 处理失败: {}", message);
            return false;
        }
    }

    let (Some(book), Some(name)) = (result.repaired(), result.download_name(config)) else {
        return false;
    };
    let directory = match &args.output_dir {
        Some(directory) => directory.clone(),
        None => source.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    let output = directory.join(name);
    match fs::write(&output, &book.bytes) {
        Ok(()) => {
            println!("  💾 已保存: {}", output.display());
            true
        }
        Err(e) => {
            println!("  ❌ 无法写入 {}: {}", output.display(), e);
            false
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
