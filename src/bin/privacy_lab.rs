use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use num_bigint::BigUint;
use privacy_lab::{
    aggregate::{aggregate, WireCiphertext},
    channel::{HandshakeSession, PeerKeyOutcome},
    config::{LabConfig, ModePreference},
    elgamal::ElGamalKeyPair,
    observer::{Sender, TracingObserver},
    paillier::PaillierKeyPair,
    rsa::RsaKeyPair,
    sharing::{ShamirScheme, Share},
    wire::{PublicKeyBundle, WireShare},
    LabError,
};
use rand::{rngs::StdRng, SeedableRng};

#[derive(Parser, Debug)]
#[command(
    about = "Secret sharing, homomorphic encryption and secure channel demos",
    author,
    version
)]
struct Cli {
    /// JSON configuration file (field, key sizes, handshake)
    #[arg(long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Seed for reproducible runs; OS entropy when omitted
    #[arg(long = "seed", global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a secret into shares
    Split {
        #[arg(long)]
        secret: String,
        #[arg(long, default_value_t = 5)]
        shares: usize,
        #[arg(long, default_value_t = 3)]
        threshold: usize,
        /// Use the 257 demo field instead of the configured one
        #[arg(long, default_value_t = false)]
        demo: bool,
    },
    /// Reconstruct a secret from a JSON array of shares
    Reconstruct {
        /// e.g. '[{"x":1,"y":"17"},{"x":3,"y":"201"}]'
        #[arg(long)]
        shares: String,
        /// Refuse to reconstruct from fewer shares
        #[arg(long)]
        threshold: Option<usize>,
        #[arg(long, default_value_t = false)]
        demo: bool,
    },
    /// Encrypt values under Paillier and add them homomorphically
    Paillier(SchemeArgs),
    /// Encrypt values under RSA and multiply them homomorphically
    Rsa(SchemeArgs),
    /// Encrypt values under ElGamal and multiply them homomorphically
    Elgamal(SchemeArgs),
    /// Run both sides of a handshake and exchange one message
    Handshake {
        #[arg(long, value_enum, default_value = "auto")]
        mode: ModeArg,
        #[arg(long, default_value = "hello from alice")]
        message: String,
    },
}

#[derive(clap::Args, Debug)]
struct SchemeArgs {
    /// Comma separated plaintexts
    #[arg(long, value_delimiter = ',', required = true)]
    values: Vec<u64>,
    /// Generate a fresh key with the configured size instead of the demo key
    #[arg(long, default_value_t = false)]
    generate: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Auto,
    Native,
    Fallback,
}

impl From<ModeArg> for ModePreference {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Auto => ModePreference::Auto,
            ModeArg::Native => ModePreference::ForceNative,
            ModeArg::Fallback => ModePreference::ForceFallback,
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("privacy-lab failed: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => LabConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => LabConfig::default(),
    };
    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    match cli.command {
        Command::Split {
            secret,
            shares,
            threshold,
            demo,
        } => {
            let scheme = scheme(&config, demo)?;
            let secret = privacy_lab::wire::parse_decimal(&secret)?;
            let shares: Vec<WireShare> = scheme
                .split(&secret, shares, threshold, &mut rng)?
                .into_iter()
                .map(WireShare::from)
                .collect();
            println!("{}", serde_json::to_string_pretty(&shares)?);
        }
        Command::Reconstruct {
            shares,
            threshold,
            demo,
        } => {
            let scheme = scheme(&config, demo)?;
            let shares: Vec<WireShare> = serde_json::from_str(&shares)?;
            let shares: Vec<Share> = shares.into_iter().map(Share::from).collect();
            let secret = match threshold {
                Some(t) => scheme.reconstruct_checked(&shares, t)?,
                None => scheme.reconstruct(&shares)?,
            };
            println!("{secret}");
        }
        Command::Paillier(args) => {
            let keys = if args.generate {
                PaillierKeyPair::generate(config.key_sizes.paillier_bits, &mut rng)?
            } else {
                PaillierKeyPair::demo()?
            };
            let batch = args
                .values
                .iter()
                .map(|v| keys.public.encrypt(&BigUint::from(*v), &mut rng).map(Into::into))
                .collect::<Result<Vec<WireCiphertext>, LabError>>()?;
            let result = aggregate(&PublicKeyBundle::Paillier(keys.public.to_bundle()), &batch)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let WireCiphertext::Single(c) = &result.ciphertext {
                println!("decrypted sum: {}", keys.private.decrypt(c)?);
            }
        }
        Command::Rsa(args) => {
            let keys = if args.generate {
                RsaKeyPair::generate(config.key_sizes.rsa_bits, &mut rng)?
            } else {
                RsaKeyPair::demo()?
            };
            let batch = args
                .values
                .iter()
                .map(|v| keys.public.encrypt(&BigUint::from(*v)).map(Into::into))
                .collect::<Result<Vec<WireCiphertext>, LabError>>()?;
            let result = aggregate(&PublicKeyBundle::Rsa(keys.public.to_bundle()), &batch)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let WireCiphertext::Single(c) = &result.ciphertext {
                println!("decrypted product: {}", keys.private.decrypt(c)?);
            }
        }
        Command::Elgamal(args) => {
            let keys = if args.generate {
                ElGamalKeyPair::generate(config.key_sizes.elgamal_bits, &mut rng)?
            } else {
                ElGamalKeyPair::demo()?
            };
            let batch = args
                .values
                .iter()
                .map(|v| keys.public.encrypt(&BigUint::from(*v), &mut rng).map(Into::into))
                .collect::<Result<Vec<WireCiphertext>, LabError>>()?;
            let result = aggregate(&PublicKeyBundle::Elgamal(keys.public.to_bundle()), &batch)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let WireCiphertext::Pair(c) = &result.ciphertext {
                println!("decrypted product: {}", keys.private.decrypt(c)?);
            }
        }
        Command::Handshake { mode, message } => {
            let mut handshake = config.handshake.clone();
            handshake.mode_preference = mode.into();
            handshake_demo(&handshake, &message)?;
        }
    }
    Ok(())
}

fn scheme(config: &LabConfig, demo: bool) -> Result<ShamirScheme, LabError> {
    if demo {
        Ok(ShamirScheme::demo())
    } else {
        ShamirScheme::new(config.field.clone())
    }
}

fn handshake_demo(
    config: &privacy_lab::config::HandshakeConfig,
    message: &str,
) -> Result<(), LabError> {
    let observer = Arc::new(TracingObserver);
    let mut alice = HandshakeSession::new(config, observer.clone())?;
    let mut bob = HandshakeSession::new(config, observer)?.as_sender(Sender::Server);

    let alice_public = alice.start()?;
    let bob_public = bob.start()?;
    alice.await_peer_key()?;
    bob.await_peer_key()?;
    let outcomes = [
        alice.receive_peer_key(&bob_public)?,
        bob.receive_peer_key(&alice_public)?,
    ];
    for outcome in &outcomes {
        if let PeerKeyOutcome::Derived { fingerprint } = outcome {
            println!("session key fingerprint: {fingerprint}");
        }
    }

    let sealed = alice.seal(message)?;
    let json =
        serde_json::to_string_pretty(&sealed).map_err(|e| LabError::Encoding(e.to_string()))?;
    println!("{json}");
    println!("bob read: {}", bob.open(&sealed)?);
    println!("mode: {}", alice.mode());
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
