use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use ledgerpay_auth::Caller;
use ledgerpay_core::{Amount, ParticipantId, TransactionId};
use ledgerpay_offline::{
    EntryVerifier, FrameLayout, OfflinePayload, author_entry, encode_batch, parse_batch,
};
use ledgerpay_signing::{ED25519_SIGNATURE_LEN, KeyPair, SigningService};
use rust_decimal_macros::dec;

struct Fixture {
    authority: SigningService,
    caller: Caller,
    layout: FrameLayout,
    batch: Vec<u8>,
}

/// A batch of `size` entries from alice to bob, signed by alice.
fn fixture(size: usize) -> Fixture {
    let authority = SigningService::new(KeyPair::generate()).expect("authority key");
    let alice = KeyPair::generate();
    let bob = KeyPair::generate();
    let alice_pem = alice.public_key_pem().expect("pem");
    let cert = authority.certify_key(alice_pem.as_bytes()).expect("certificate");

    let alice_id = ParticipantId::parse("alice").expect("id");
    let bob_id = ParticipantId::parse("bob").expect("id");

    let entries: Vec<Vec<u8>> = (0..size)
        .map(|_| {
            let payload = OfflinePayload {
                id: TransactionId::new(),
                sender_id: alice_id.clone(),
                receiver_id: bob_id.clone(),
                amount: Amount::new(dec!(1.25)).expect("amount"),
                timestamp: Utc::now(),
            };
            author_entry(&payload, &alice, &cert).expect("entry")
        })
        .collect();

    Fixture {
        authority,
        caller: Caller::new(bob_id, bob.public_key_pem().expect("pem")),
        layout: FrameLayout::for_authority(&authority, ED25519_SIGNATURE_LEN),
        batch: encode_batch(entries),
    }
}

fn bench_parse_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_batch");

    for size in [1, 10, 100, 1000].iter() {
        let fixture = fixture(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &fixture.batch, |b, batch| {
            b.iter(|| parse_batch(black_box(batch), fixture.layout).expect("parse"));
        });
    }

    group.finish();
}

fn bench_verify_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_batch");

    for size in [1, 10, 100].iter() {
        let fixture = fixture(*size);
        let entries = parse_batch(&fixture.batch, fixture.layout).expect("parse");
        let verifier = EntryVerifier::new(&fixture.authority, &fixture.caller);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &entries, |b, entries| {
            b.iter(|| {
                for entry in entries {
                    verifier.verify(black_box(entry)).expect("verify");
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_batch, bench_verify_batch);
criterion_main!(benches);
