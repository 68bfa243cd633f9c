use ark_bls12_381::G1Projective;
use ark_std::rand::{rngs::StdRng, SeedableRng};
use clap::Parser;
use tracing::{error, info};

use threshold_tally::{
    ballot::{encrypt_ballot, BallotBoxState, CiphertextTally, PlaintextBallot},
    context::{CeremonyDetails, ElectionContext},
    guardian::Guardian,
    key_ceremony::perform_key_ceremony,
    manifest::{ContestDescription, Manifest, SelectionDescription},
    mediator::DecryptionMediator,
    TallyError,
};

type G = G1Projective;

const CANDIDATES: [&str; 3] = ["alice", "bob", "carol"];

#[derive(Parser, Debug)]
#[command(
    about = "Runs a key ceremony, encrypts ballots and decrypts the tally with a quorum",
    author,
    version
)]
struct Cli {
    /// Number of guardians
    #[arg(long = "guardians", default_value_t = 5)]
    guardians: u64,

    /// Guardians needed to decrypt
    #[arg(long = "quorum", default_value_t = 3)]
    quorum: u64,

    /// Sequence orders of the guardians taking part in decryption
    /// (defaults to the first `quorum` guardians)
    #[arg(long = "present", value_delimiter = ',')]
    present: Vec<u64>,

    /// Number of cast ballots
    #[arg(long = "ballots", default_value_t = 20)]
    ballots: usize,

    /// Seed for the random number generator
    #[arg(long = "seed", default_value_t = 0)]
    seed: u64,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("demo failed: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), TallyError> {
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let details = CeremonyDetails::new(cli.guardians, cli.quorum)?;

    let mut guardians = (1..=details.number_of_guardians)
        .map(|i| Guardian::<G>::new(format!("guardian-{}", i), i, details, &mut rng))
        .collect::<Result<Vec<_>, _>>()?;
    let joint_key = perform_key_ceremony(&mut guardians, &mut rng)?;

    let selections = CANDIDATES
        .iter()
        .zip(1u64..)
        .map(|(id, order)| SelectionDescription::new(*id, order))
        .collect();
    let manifest = Manifest::new("demo", vec![ContestDescription::new("mayor", 1, selections)?])?;
    let context = ElectionContext::new(details, &joint_key, manifest.crypto_hash()?)?;

    let mut tally = CiphertextTally::new("tally", &manifest);
    for i in 0..cli.ballots {
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
        )?;
        tally.append(&encrypted)?;
    }
    info!("encrypted {} ballots", tally.cast_count());

    let present: Vec<String> = if cli.present.is_empty() {
        (1..=details.quorum).map(|i| format!("guardian-{}", i)).collect()
    } else {
        cli.present.iter().map(|i| format!("guardian-{}", i)).collect()
    };
    let keys = guardians.iter().map(|g| g.share_public_key()).collect();
    let mut mediator = DecryptionMediator::new("demo-mediator", context.clone(), keys, &present)?;
    mediator.add_tally(tally)?;
    let plaintext = mediator.decrypt_with_guardians(&guardians, "tally")?;

    for (contest_id, selections) in plaintext.counts() {
        for (selection_id, count) in selections {
            println!("{}/{}: {}", contest_id, selection_id, count);
        }
    }
    info!("proofs verify: {}", plaintext.verify(&context));
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .try_init();
    });
}
