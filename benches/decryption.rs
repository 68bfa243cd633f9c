use ark_bls12_381::G1Projective;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use threshold_tally::{
    ballot::{encrypt_ballot, BallotBoxState, CiphertextTally, PlaintextBallot},
    context::{CeremonyDetails, ElectionContext},
    guardian::Guardian,
    key_ceremony::perform_key_ceremony,
    manifest::{ContestDescription, Manifest, SelectionDescription},
    mediator::DecryptionMediator,
};

type G = G1Projective;

const CANDIDATES: [&str; 4] = ["alice", "bob", "carol", "dave"];

fn manifest() -> Manifest<ark_bls12_381::Fr> {
    let selections = CANDIDATES
        .iter()
        .zip(1u64..)
        .map(|(id, order)| SelectionDescription::new(*id, order))
        .collect();
    let contest = ContestDescription::new("mayor", 1, selections).unwrap();
    Manifest::new("bench", vec![contest]).unwrap()
}

fn guardians(details: CeremonyDetails, rng: &mut impl ark_std::rand::RngCore) -> Vec<Guardian<G>> {
    (1..=details.number_of_guardians)
        .map(|i| Guardian::new(format!("guardian-{}", i), i, details, rng).unwrap())
        .collect()
}

fn bench_key_ceremony(c: &mut Criterion) {
    let mut rng = ark_std::test_rng();
    let mut group = c.benchmark_group("key_ceremony");
    group.sample_size(10);

    for n in [3u64, 5, 7, 9] {
        let details = CeremonyDetails::new(n, n / 2 + 1).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &details, |b, details| {
            b.iter(|| {
                let mut guardians = guardians(*details, &mut rng);
                perform_key_ceremony(&mut guardians, &mut rng).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_decrypt_tally(c: &mut Criterion) {
    let mut rng = ark_std::test_rng();
    let mut group = c.benchmark_group("decrypt_tally");
    group.sample_size(10);

    for n in [3u64, 5, 7, 9] {
        let quorum = n / 2 + 1;
        let details = CeremonyDetails::new(n, quorum).unwrap();
        let manifest = manifest();
        let mut guardians = guardians(details, &mut rng);
        let joint_key = perform_key_ceremony(&mut guardians, &mut rng).unwrap();
        let context =
            ElectionContext::new(details, &joint_key, manifest.crypto_hash().unwrap()).unwrap();

        let mut tally = CiphertextTally::new("tally", &manifest);
        for i in 0..50 {
            let ballot = PlaintextBallot::new(format!("ballot-{}", i)).with_vote(
                "mayor",
                CANDIDATES[i % CANDIDATES.len()],
                1,
            );
            let encrypted = encrypt_ballot(
                &ballot,
                &manifest,
                &context.joint_public_key,
                BallotBoxState::Cast,
                &mut rng,
            )
            .unwrap();
            tally.append(&encrypted).unwrap();
        }

        // the first `quorum` guardians decrypt
        let keys: Vec<_> = guardians.iter().map(|g| g.share_public_key()).collect();
        let present: Vec<String> = guardians
            .iter()
            .take(quorum as usize)
            .map(|g| g.id().to_string())
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(n),
            &(context, keys, present, tally),
            |b, inp| {
                b.iter(|| {
                    let mut mediator =
                        DecryptionMediator::new("bench", inp.0.clone(), inp.1.clone(), &inp.2)
                            .unwrap();
                    mediator.add_tally(inp.3.clone()).unwrap();
                    mediator.decrypt_with_guardians(&guardians, "tally").unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_key_ceremony, bench_decrypt_tally);
criterion_main!(benches);
