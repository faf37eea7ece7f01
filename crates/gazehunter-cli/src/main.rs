use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gazehunter_core::{
    categorize_apps, load_rule_table, load_terms, normalize_apps, report_stats, require_dir, run_pipeline, search_apps,
    Categorizer, FsSink, FsSource, RuleTable, ScanOptions, ScanStats, SearchTerm, DEFAULT_MAX_EXAMPLES,
    DEFAULT_MAX_HITS_PER_TERM, DEFAULT_MAX_TERMS, DEFAULT_MIN_LEN, NORMALIZED_SUBDIR,
};
use std::path::PathBuf;
use tracing::info;

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "gazehunter", version, about = "原生库眼动追踪 API 证据扫描")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// 输入目录（每个子目录为一个已解包的应用）
    #[arg(long)]
    input: PathBuf,

    /// 扫描的二进制扩展名，可重复（不区分大小写）
    #[arg(long = "ext", default_value = "so")]
    extensions: Vec<String>,

    /// 每个应用最多处理的文件数（排序后截断）
    #[arg(long)]
    max_files_per_app: Option<usize>,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// 扫描结果目录
    #[arg(long, default_value = "./scan-results")]
    output: PathBuf,

    /// 线程数（"auto"=CPU 核心数；1=串行）
    #[arg(long, default_value = "auto")]
    threads: String,

    /// JSON 记录中不写 timestamp_utc（输出完全可复现）
    #[arg(long)]
    no_timestamp: bool,
}

#[derive(Args, Debug)]
struct TermArgs {
    /// 搜索词列表（每行一个，# 开头为注释）
    #[arg(long, default_value = "./search_terms.txt")]
    terms: PathBuf,

    /// 最多加载的搜索词数量
    #[arg(long, default_value_t = DEFAULT_MAX_TERMS)]
    max_terms: usize,
}

#[derive(Args, Debug)]
struct CategoryArgs {
    /// 分类规则文件（TOML）；缺省使用内置规则表
    #[arg(long)]
    rules: Option<PathBuf>,

    /// 未分类的词并入基线（enablement）分类
    #[arg(long)]
    fold_unclassified: bool,

    /// 每词每文件最多收集的示例行数
    #[arg(long, default_value_t = DEFAULT_MAX_EXAMPLES)]
    max_examples: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 抽取二进制中的可打印 ASCII 串，写出归一化文本
    Normalize {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        out: OutputArgs,
        /// 最小串长度
        #[arg(long, default_value_t = DEFAULT_MIN_LEN)]
        min_len: usize,
    },
    /// 在原始字节上搜索 UTF-8 / UTF-16LE 编码的搜索词
    Search {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        out: OutputArgs,
        #[command(flatten)]
        terms: TermArgs,
        /// 每词每文件的命中上限
        #[arg(long, default_value_t = DEFAULT_MAX_HITS_PER_TERM)]
        max_hits: usize,
    },
    /// 扫描归一化文本并分类，生成主报告与 CSV 导出
    Categorize {
        #[command(flatten)]
        out: OutputArgs,
        #[command(flatten)]
        terms: TermArgs,
        #[command(flatten)]
        category: CategoryArgs,
    },
    /// 依次执行 normalize → search → categorize
    Run {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        out: OutputArgs,
        #[command(flatten)]
        terms: TermArgs,
        #[command(flatten)]
        category: CategoryArgs,
        #[arg(long, default_value_t = DEFAULT_MIN_LEN)]
        min_len: usize,
        #[arg(long, default_value_t = DEFAULT_MAX_HITS_PER_TERM)]
        max_hits: usize,
    },
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Normalize { input, out, min_len } => {
            require_dir(&input.input)?;
            let opts = ScanOptions { min_string_len: min_len, ..base_options(Some(&input), &out) };
            info!(input = ?input.input, output = ?out.output, "starting normalize");

            let src = FsSource::new(&input.input, &opts.extensions);
            let mut sink = FsSink::new(&out.output);
            let stats = normalize_apps(&src, &mut sink, &opts).context("normalize failed")?;
            log_stats("normalize", &stats);
        }
        Commands::Search { input, out, terms, max_hits } => {
            require_dir(&input.input)?;
            let opts = ScanOptions { max_hits_per_term: max_hits, ..base_options(Some(&input), &out) };
            let terms = read_terms(&terms)?;
            info!(input = ?input.input, output = ?out.output, terms = terms.len(), "starting raw search");

            let src = FsSource::new(&input.input, &opts.extensions);
            let mut sink = FsSink::new(&out.output);
            let stats = search_apps(&src, &mut sink, &terms, &opts).context("raw search failed")?;
            log_stats("search", &stats);
        }
        Commands::Categorize { out, terms, category } => {
            require_dir(&out.output)?;
            let opts = ScanOptions { max_examples_per_term: category.max_examples, ..base_options(None, &out) };
            let terms = read_terms(&terms)?;
            let categorizer = build_categorizer(&category)?;
            info!(output = ?out.output, terms = terms.len(), fallback = categorizer.fallback(), "starting categorize");

            let src = FsSource::new(&out.output, &["txt".to_string()]).with_subdir(NORMALIZED_SUBDIR);
            let mut sink = FsSink::new(&out.output);
            let report = categorize_apps(&src, &mut sink, &terms, &categorizer, &opts).context("categorize failed")?;
            log_stats("categorize", &report_stats(&report));
            log_enablement_only(report.baseline(), &report.enablement_only());
        }
        Commands::Run { input, out, terms, category, min_len, max_hits } => {
            require_dir(&input.input)?;
            let opts = ScanOptions {
                min_string_len: min_len,
                max_hits_per_term: max_hits,
                max_examples_per_term: category.max_examples,
                ..base_options(Some(&input), &out)
            };
            let terms = read_terms(&terms)?;
            let categorizer = build_categorizer(&category)?;
            info!(input = ?input.input, output = ?out.output, terms = terms.len(), "starting full run");

            let summary =
                run_pipeline(&input.input, &out.output, &terms, &categorizer, &opts).context("scan pipeline failed")?;
            log_stats("normalize", &summary.normalize);
            log_stats("search", &summary.search);
            log_stats("categorize", &summary.categorize);
            let apps: Vec<&str> = summary.enablement_only.iter().map(String::as_str).collect();
            log_enablement_only(categorizer.baseline(), &apps);
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 组装各子命令共享的扫描参数
fn base_options(input: Option<&InputArgs>, out: &OutputArgs) -> ScanOptions {
    let mut opts = ScanOptions {
        threads: parse_threads(&out.threads),
        timestamps: !out.no_timestamp,
        ..ScanOptions::default()
    };
    if let Some(input) = input {
        opts.extensions = input.extensions.clone();
        opts.max_files_per_app = input.max_files_per_app;
    }
    opts
}

fn read_terms(args: &TermArgs) -> Result<Vec<SearchTerm>> {
    let terms = load_terms(&args.terms, args.max_terms)?;
    info!(path = ?args.terms, loaded = terms.len(), "search terms loaded");
    Ok(terms)
}

fn build_categorizer(args: &CategoryArgs) -> Result<Categorizer> {
    let table = match &args.rules {
        Some(path) => load_rule_table(path)?,
        None => RuleTable::builtin().context("load builtin rule table")?,
    };
    Ok(Categorizer::new(&table, args.fold_unclassified))
}

fn log_stats(stage: &str, stats: &ScanStats) {
    info!(
        stage,
        apps = stats.apps,
        artifacts = stats.artifacts,
        artifacts_with_hits = stats.artifacts_with_hits,
        hits = stats.hits,
        errors = stats.errors,
        "stage finished"
    );
}

fn log_enablement_only(baseline: &str, apps: &[&str]) {
    if apps.is_empty() {
        info!(baseline, "no apps with only baseline hits");
    }
    for app in apps {
        info!(baseline, app = *app, "enablement-only app");
    }
}

/// 解析线程参数
fn parse_threads(s: &str) -> Option<usize> {
    if s.eq_ignore_ascii_case("auto") {
        return None;
    }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Some(n),
        _ => None,
    }
}
