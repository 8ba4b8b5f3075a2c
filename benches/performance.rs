use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

use reconciliation_engine::cache::{CacheKeys, CacheStats, CachedList};
use reconciliation_engine::models::{BankTransaction, CompanyScope, OpenAccount, Payable, Receivable};
use reconciliation_engine::observability::LatencyTimer;
use reconciliation_engine::services::MatchingEngine;

fn date(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(offset % 365)
}

fn transactions(company: Uuid, size: usize) -> Vec<BankTransaction> {
    (0..size)
        .map(|i| {
            let cents = Decimal::new((i as i64 * 7919) % 500_000 + 100, 2);
            let amount = if i % 2 == 0 { -cents } else { cents };
            BankTransaction::new(company, amount, date(i as u64), "MOVIMENTO")
        })
        .collect()
}

fn accounts(company: Uuid, size: usize) -> Vec<OpenAccount> {
    (0..size)
        .map(|i| {
            let amount = Decimal::new((i as i64 * 7919) % 500_000 + 100, 2);
            if i % 2 == 0 {
                Payable::new(company, amount, date(i as u64), "Fornecedor").into()
            } else {
                Receivable::new(company, amount, date(i as u64), "Cliente").into()
            }
        })
        .collect()
}

fn benchmark_ranking(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranking");
    group.measurement_time(Duration::from_secs(10));
    let engine = MatchingEngine::default();
    let company = Uuid::new_v4();

    for size in [100, 500, 5000].iter() {
        let pool = transactions(company, *size);
        let account = accounts(company, 1).remove(0);

        group.bench_with_input(BenchmarkId::new("rank_transactions", size), size, |b, _| {
            b.iter(|| black_box(engine.rank_transactions(&account, pool.clone())));
        });

        let open = accounts(company, *size);
        let transaction = pool[0].clone();
        group.bench_with_input(BenchmarkId::new("rank_accounts", size), size, |b, _| {
            b.iter(|| black_box(engine.rank_accounts(&transaction, open.clone())));
        });
    }

    group.finish();
}

fn benchmark_auto_match_pairing(c: &mut Criterion) {
    let mut group = c.benchmark_group("auto_match");
    let engine = MatchingEngine::default();
    let company = Uuid::new_v4();

    for size in [100, 500].iter() {
        let txs = transactions(company, *size);
        let open = accounts(company, *size);

        group.bench_with_input(BenchmarkId::new("unambiguous_pairs", size), size, |b, _| {
            b.iter(|| black_box(engine.unambiguous_pairs(&txs, &open)));
        });
    }

    group.finish();
}

fn benchmark_cache_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");
    let keys = CacheKeys::new("recon");
    let scope = CompanyScope::new((0..5).map(|_| Uuid::new_v4())).unwrap();

    group.bench_function("list_key", |b| {
        b.iter(|| black_box(keys.list_key(CachedList::OrphanTransactions, &scope, 100)));
    });

    group.bench_function("hit_rate_calculation", |b| {
        let stats = CacheStats::new();
        for _ in 0..1000 {
            stats.record_hit();
        }
        for _ in 0..100 {
            stats.record_miss();
        }

        b.iter(|| black_box(stats.hit_rate()));
    });

    group.finish();
}

fn benchmark_latency_timer(c: &mut Criterion) {
    let mut group = c.benchmark_group("latency_timer");

    group.bench_function("create_and_elapsed", |b| {
        b.iter(|| {
            let timer = LatencyTimer::new();
            black_box(timer.elapsed_ms())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_ranking,
    benchmark_auto_match_pairing,
    benchmark_cache_keys,
    benchmark_latency_timer,
);

criterion_main!(benches);
