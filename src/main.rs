//! offcash - command line front end over a sled-backed ledger.
//!
//! Commands:
//! - `keygen`: create the issuer key (or print a throwaway sender key)
//! - `public-key`: print the issuer public key
//! - `issue`, `show`, `validate`, `divide`: token operations
//! - `spend`: run one offline transaction through the reconciler

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use offcash::identity::Keypair;
use offcash::storage::SledLedger;
use offcash::sync::TransactionSubmission;
use offcash::token::{OwnerId, Token, TokenCodec, TokenId};
use offcash::TokenService;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "offcash", version, about = "Offline bearer-token ledger")]
struct Cli {
    /// Data directory for the ledger
    #[arg(long, default_value = "./offcash_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create and store the issuer keypair
    Keygen {
        /// Replace an existing issuer key
        #[arg(long)]
        force: bool,

        /// Print a fresh keypair as hex instead of storing it (for senders)
        #[arg(long)]
        print_only: bool,
    },

    /// Print the issuer public key as hex
    PublicKey,

    /// Issue tokens worth AMOUNT to OWNER
    Issue {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        amount: Decimal,
    },

    /// Show the stored record of a token
    Show { token_id: TokenId },

    /// Validate an encoded token (base64) for a claimed owner
    Validate {
        #[arg(long)]
        owner: String,
        token: String,
    },

    /// Divide a stored token to pay AMOUNT
    Divide {
        token_id: TokenId,
        #[arg(long)]
        amount: Decimal,
    },

    /// Submit one offline transaction through the reconciler
    Spend {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        local_id: String,
        #[arg(long)]
        amount: Decimal,
        /// purchase, redemption or transfer
        #[arg(long = "type", default_value = "purchase")]
        tx_type: String,
        #[arg(long)]
        receiver: Option<String>,
        /// Sender secret key as hex; signs the submission
        #[arg(long)]
        sender_key: Option<String>,
        #[arg(required = true)]
        tokens: Vec<TokenId>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("offcash=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Keygen {
        print_only: true, ..
    } = cli.command
    {
        let keypair = Keypair::generate();
        println!("public key: {}", keypair.public_key());
        println!("secret key: {}", hex::encode(keypair.to_bytes()));
        return Ok(());
    }

    let ledger = Arc::new(
        SledLedger::open(&cli.data_dir)
            .with_context(|| format!("could not open ledger at {}", cli.data_dir.display()))?,
    );

    run(&ledger, cli.command)?;
    ledger.flush()?;
    Ok(())
}

fn service(ledger: &Arc<SledLedger>) -> Result<TokenService> {
    let keypair = ledger
        .load_issuer_keypair()?
        .context("no issuer key yet, run `offcash keygen`")?;
    Ok(TokenService::with_defaults(keypair, ledger.clone())?)
}

fn keygen(ledger: &SledLedger, force: bool) -> Result<()> {
    if !force {
        if let Some(existing) = ledger.load_issuer_keypair()? {
            bail!(
                "issuer key {} already exists, pass --force to replace it",
                existing.public_key()
            );
        }
    }
    let keypair = Keypair::generate();
    ledger.save_issuer_keypair(&keypair)?;
    println!("issuer public key: {}", keypair.public_key());
    Ok(())
}

fn run(ledger: &Arc<SledLedger>, command: Commands) -> Result<()> {
    match command {
        Commands::Keygen { force, .. } => keygen(ledger, force)?,
        Commands::PublicKey => {
            let keypair = ledger
                .load_issuer_keypair()?
                .context("no issuer key yet, run `offcash keygen`")?;
            println!("{}", keypair.public_key());
        }
        Commands::Issue { owner, amount } => {
            let tokens = service(ledger)?.issue(&OwnerId::new(owner), amount)?;
            for token in &tokens {
                print_token(token)?;
            }
        }
        Commands::Show { token_id } => {
            let token = stored_token(ledger, &token_id)?;
            print_token(&token)?;
        }
        Commands::Validate { owner, token } => {
            let token = TokenCodec::decode_base64(&token)?;
            let result = service(ledger)?.validate(&token, &OwnerId::new(owner))?;
            println!("token:      {}", token.id());
            println!("signature:  {}", result.signature_valid);
            println!("not expired: {}", result.not_expired);
            println!("not spent:  {}", result.not_spent);
            println!("ownership:  {}", result.ownership_valid);
            println!("spendable:  {}", result.is_spendable());
        }
        Commands::Divide { token_id, amount } => {
            let token = stored_token(ledger, &token_id)?;
            let division = service(ledger)?.divide(&token, amount)?;
            println!("payment:");
            print_token(&division.payment)?;
            if let Some(change) = &division.change {
                println!("change:");
                print_token(change)?;
            }
        }
        Commands::Spend {
            owner,
            local_id,
            amount,
            tx_type,
            receiver,
            sender_key,
            tokens,
        } => {
            let owner = OwnerId::new(owner);
            let mut submission = TransactionSubmission::new(
                local_id,
                owner.clone(),
                amount,
                tx_type,
                tokens,
                Utc::now(),
            );
            if let Some(receiver) = receiver {
                submission = submission.with_receiver(OwnerId::new(receiver));
            }
            if let Some(secret) = sender_key {
                let bytes = hex::decode(secret.trim()).context("sender key is not hex")?;
                let keypair = Keypair::from_bytes(&bytes)?;
                submission = submission.signed_by(&keypair);
            }

            for outcome in service(ledger)?.sync_batch(&owner, vec![submission])? {
                println!("{}: {}", outcome.local_id, outcome.status);
                if let Some(tx_id) = outcome.server_transaction_id {
                    println!("  transaction: {}", tx_id);
                }
                if let Some(reason) = &outcome.reason {
                    println!("  reason: {}", reason);
                }
                if let Some(conflict) = &outcome.conflict {
                    println!("  resolution: {}", conflict.resolution);
                }
                for token in &outcome.issued_tokens {
                    println!("  change:");
                    print_token(token)?;
                }
            }
        }
    }
    Ok(())
}

fn stored_token(ledger: &SledLedger, id: &TokenId) -> Result<Token> {
    use offcash::ledger::TokenLedger;
    match ledger.get_token(id)? {
        Some(token) => Ok(token),
        None => bail!("token {} not found", id),
    }
}

fn print_token(token: &Token) -> Result<()> {
    println!("  id:      {}", token.id());
    println!("  owner:   {}", token.owner_id());
    println!("  amount:  {}", token.amount());
    println!("  status:  {}", token.status());
    println!("  expires: {}", token.expires_at());
    if let Some(parent) = token.parent_token_id() {
        println!("  parent:  {}", parent);
    }
    println!("  encoded: {}", TokenCodec::encode_base64(token)?);
    Ok(())
}
