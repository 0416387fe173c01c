//! Benchmarks for zentinel-waf.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zentinel_waf::operators::{CompileContext, CompiledOperator, EvalContext, NoMacros};
use zentinel_waf::parser::parse_operator;
use zentinel_waf::transformations::TransformationPipeline;
use zentinel_waf::{Engine, LimitGuard, MatchLimits, Registry};

// ============================================================================
// Test Data
// ============================================================================

const SIMPLE_RULES: &str = r#"
SecRuleEngine On
SecRule REQUEST_URI "@contains /admin" "id:1,phase:1,deny,status:403"
"#;

const INSPECTION_RULES: &str = r#"
SecRuleEngine On
SecRequestBodyAccess On
SecDefaultAction "phase:2,log,auditlog,deny,status:403"

SecRule REQUEST_HEADERS:Content-Type "application/json" \
    "id:100,phase:1,pass,nolog,ctl:requestBodyProcessor=JSON"

SecRule REQUEST_URI|ARGS|ARGS_NAMES "@rx (?i)(?:union.*select|select.*from|insert.*into)" \
    "id:942101,phase:2,block,\
    msg:'SQL Injection Attack',\
    logdata:'%{MATCHED_VAR_NAME}=%{MATCHED_VAR}',\
    tag:'attack-sqli',\
    severity:'CRITICAL',\
    t:none,t:urlDecodeUni,t:htmlEntityDecode,t:lowercase,\
    setvar:tx.anomaly=+5"

SecRule ARGS "@pm <script javascript: onerror= onload=" \
    "id:941101,phase:2,block,msg:'XSS Attack',t:none,t:lowercase,setvar:tx.anomaly=+5"

SecRule REQUEST_METHOD "@streq POST" "id:200,phase:2,pass,nolog,chain"
    SecRule &ARGS_POST "@gt 50" "setvar:tx.many_args=1"

SecRule TX:anomaly "@ge 10" "id:949110,phase:2,deny,status:403,msg:'Anomaly score exceeded'"
"#;

const CLEAN_REQUESTS: &[(&str, &str)] = &[
    ("/", "GET"),
    ("/api/users", "GET"),
    ("/api/users/123", "GET"),
    ("/search?q=hello+world", "GET"),
    ("/products?category=electronics&page=1", "GET"),
];

const ATTACK_REQUESTS: &[&str] = &[
    "/api/users?id=1%20UNION%20SELECT%20password%20FROM%20users",
    "/search?q=%3Cscript%3Ealert(1)%3C/script%3E",
    "/page?next=javascript:alert(1)",
];

const BODY_SIZES: &[usize] = &[0, 100, 1_000, 10_000, 100_000];

// ============================================================================
// Benchmark: Rule Compilation
// ============================================================================

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    group.bench_function("simple", |b| {
        b.iter(|| Engine::from_string(black_box(SIMPLE_RULES)).unwrap())
    });
    group.bench_function("inspection", |b| {
        b.iter(|| Engine::from_string(black_box(INSPECTION_RULES)).unwrap())
    });

    group.finish();
}

// ============================================================================
// Benchmark: Transactions
// ============================================================================

fn run_request(engine: &Engine, uri: &str, method: &str, body: Option<&[u8]>) -> bool {
    let mut tx = engine.new_transaction();
    tx.process_connection("192.0.2.1", 50000, "192.0.2.2", 80)
        .unwrap();
    tx.process_uri(uri, method, "HTTP/1.1").unwrap();
    tx.add_request_header("Host", "example.com").unwrap();
    tx.add_request_header("Content-Type", "application/x-www-form-urlencoded")
        .unwrap();
    tx.process_request_headers().unwrap();
    if let Some(body) = body {
        tx.append_request_body(body).unwrap();
    }
    tx.process_request_body().unwrap();
    tx.process_logging().unwrap();
    tx.intervention().is_some()
}

fn bench_transactions(c: &mut Criterion) {
    let engine = Engine::from_string(INSPECTION_RULES).unwrap();
    let mut group = c.benchmark_group("transaction");
    group.throughput(Throughput::Elements(1));

    group.bench_function("clean_traffic", |b| {
        let mut idx = 0;
        b.iter(|| {
            let (uri, method) = CLEAN_REQUESTS[idx % CLEAN_REQUESTS.len()];
            idx += 1;
            run_request(&engine, black_box(uri), method, None)
        })
    });

    group.bench_function("attack_traffic", |b| {
        let mut idx = 0;
        b.iter(|| {
            let uri = ATTACK_REQUESTS[idx % ATTACK_REQUESTS.len()];
            idx += 1;
            run_request(&engine, black_box(uri), "GET", None)
        })
    });

    group.finish();
}

fn bench_body_processing(c: &mut Criterion) {
    let engine = Engine::from_string(INSPECTION_RULES).unwrap();
    let mut group = c.benchmark_group("body_processing");

    for &size in BODY_SIZES {
        let body = generate_body(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("urlencoded", size), &body, |b, body| {
            b.iter(|| run_request(&engine, "/api/data", "POST", Some(black_box(body.as_bytes()))))
        });
    }

    let spill_engine = Engine::from_string(
        "SecRequestBodyAccess On\nSecRequestBodyInMemoryLimit 1024\nSecRequestBodyNoFilesLimit 1048576\n",
    )
    .unwrap();
    let body = generate_body(100_000);
    group.throughput(Throughput::Bytes(body.len() as u64));
    group.bench_function("spill_to_disk", |b| {
        b.iter(|| run_request(&spill_engine, "/upload", "POST", Some(black_box(body.as_bytes()))))
    });

    group.finish();
}

// ============================================================================
// Benchmark: Operators and Transformations
// ============================================================================

fn bench_operators(c: &mut Criterion) {
    let registry = Registry::default();
    let ctx = CompileContext {
        registry: &registry,
        limits: MatchLimits::default(),
        base_dir: None,
    };
    let compile = |op: &str| CompiledOperator::compile(&parse_operator(op).unwrap(), &ctx).unwrap();
    let guard = LimitGuard::default();
    let eval = EvalContext {
        guard: &guard,
        macros: &NoMacros,
    };

    let mut group = c.benchmark_group("operators");

    let rx = compile(r"@rx (?i)select.*from");
    group.bench_function("rx_match", |b| {
        b.iter(|| rx.evaluate(black_box("SELECT * FROM users"), &eval))
    });
    group.bench_function("rx_no_match", |b| {
        b.iter(|| rx.evaluate(black_box("hello world"), &eval))
    });

    let backtracking = compile(r"@rx (a|b|ab)*(?=c)");
    let input = "ab".repeat(30);
    group.bench_function("rx_limit_exceeded", |b| {
        b.iter(|| backtracking.evaluate(black_box(&input), &eval))
    });

    let pm = compile("@pm select union insert delete");
    group.bench_function("pm_match", |b| {
        b.iter(|| pm.evaluate(black_box("trying to union the data"), &eval))
    });

    let ip = compile("@ipMatch 10.0.0.0/8,192.168.0.0/16,2001:db8::/32");
    group.bench_function("ip_match", |b| {
        b.iter(|| ip.evaluate(black_box("192.168.10.20"), &eval))
    });

    group.finish();
}

fn bench_transformations(c: &mut Criterion) {
    let registry = Registry::default();
    let mut group = c.benchmark_group("transformations");

    for (name, input) in [
        ("urlDecodeUni", "hello%20world%u0021"),
        ("htmlEntityDecode", "&lt;script&gt;alert(1)&lt;/script&gt;"),
        ("base64Decode", "SGVsbG8gV29ybGQh"),
        ("normalizePath", "/foo/../bar/./baz"),
        ("cmdLine", "CMD;/C;DIR"),
    ] {
        let pipeline = TransformationPipeline::from_names(&[name], &registry).unwrap();
        group.bench_function(name, |b| b.iter(|| pipeline.apply(black_box(input)).len()));
    }

    let chain = TransformationPipeline::from_names(
        &["urlDecodeUni", "htmlEntityDecode", "lowercase", "compressWhitespace"],
        &registry,
    )
    .unwrap();
    group.bench_function("crs_chain", |b| {
        b.iter(|| chain.apply(black_box("%3CScript%3E&lt;ALERT&gt;  (1)")).len())
    });

    group.finish();
}

// ============================================================================
// Helper Functions
// ============================================================================

fn generate_body(size: usize) -> String {
    let mut body = String::with_capacity(size);
    let mut param_num = 0;
    loop {
        let param = format!("param{}=value{}&", param_num, param_num);
        if body.len() + param.len() > size {
            break;
        }
        body.push_str(&param);
        param_num += 1;
    }
    if body.ends_with('&') {
        body.pop();
    }
    body
}

criterion_group!(
    benches,
    bench_compile,
    bench_transactions,
    bench_body_processing,
    bench_operators,
    bench_transformations,
);

criterion_main!(benches);
