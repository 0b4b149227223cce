use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use seal_file::{
    BatchReport, Credential, DEFAULT_CHUNK_SIZE, DecryptOptions, EncryptOptions, KdfParams,
    KeepNames, PrivateKey, SealFileError, decrypt_directory, decrypt_file, encrypt_directory,
    encrypt_file, generate_key_pair, generate_keyfile, load_private_key, load_public_key,
    read_keyfile, save_key_pair,
};
use secrecy::SecretString;
use zeroize::Zeroize;

#[derive(Parser, Debug)]
#[command(
    name = "seal-file",
    version,
    about = "Encrypt and decrypt files and directories"
)]
struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encrypt a file or every file in a directory
    Enc(EncArgs),
    /// Decrypt a file or every .enc file in a directory
    Dec(DecArgs),
    /// Generate an X25519 key pair (seal_file.public / seal_file.private)
    Keygen(KeygenArgs),
    /// Generate a random keyfile
    Keyfile(KeyfileArgs),
}

#[derive(Args, Debug)]
struct KdfArgs {
    /// Argon2id memory cost in MiB
    #[arg(long = "kdf-mem-mib", default_value_t = KdfParams::default().mem_kib / 1024)]
    mem_mib: u32,

    /// Argon2id passes
    #[arg(long = "kdf-time", default_value_t = KdfParams::default().t_cost)]
    time: u32,

    /// Argon2id lanes
    #[arg(long = "kdf-parallelism", default_value_t = KdfParams::default().parallelism)]
    parallelism: u32,
}

impl KdfArgs {
    fn params(&self) -> KdfParams {
        KdfParams {
            t_cost: self.time,
            mem_kib: self.mem_mib.saturating_mul(1024),
            parallelism: self.parallelism,
        }
    }
}

#[derive(Args, Debug)]
struct SecretArgs {
    /// Read password from file instead of interactive prompt
    #[arg(short = 'p', long = "password-file")]
    password_file: Option<PathBuf>,

    /// Ask for a password even when a keyfile is given
    #[arg(long)]
    password: bool,

    /// Keyfile; its first 64 bytes are used
    #[arg(short = 'k', long)]
    keyfile: Option<PathBuf>,

    /// Private key file (seal_file.private)
    #[arg(long = "private-key")]
    private_key: Option<PathBuf>,

    /// Read the private key passphrase from file
    #[arg(long = "key-passphrase-file")]
    key_passphrase_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct EncArgs {
    /// Input file or directory
    #[arg(short = 'i', long = "in")]
    input: PathBuf,

    /// Output file (encrypted). If omitted, ".enc" is appended.
    #[arg(short = 'o', long = "out")]
    output: Option<PathBuf>,

    #[command(flatten)]
    secret: SecretArgs,

    /// Recipient public key (file or Base64 text); repeat for several.
    /// With --private-key the sender is authenticated.
    #[arg(short = 'r', long = "recipient")]
    recipients: Vec<String>,

    /// Plaintext bytes per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Give encrypted files random names
    #[arg(long)]
    obfuscate_names: bool,

    /// Delete the plaintext after a successful encryption
    #[arg(long)]
    overwrite_input: bool,

    /// Overwrite output if it exists
    #[arg(short = 'f', long = "force")]
    force: bool,

    #[command(flatten)]
    kdf: KdfArgs,
}

#[derive(Args, Debug)]
struct DecArgs {
    /// Input file or directory
    #[arg(short = 'i', long = "in")]
    input: PathBuf,

    /// Output file (plaintext). If omitted, ".enc" is stripped or ".dec" is appended.
    #[arg(short = 'o', long = "out")]
    output: Option<PathBuf>,

    #[command(flatten)]
    secret: SecretArgs,

    /// Sender public key, for files with an authenticated sender
    #[arg(long)]
    sender: Option<String>,

    /// Plaintext bytes per chunk used when encrypting
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Delete the encrypted file after a successful decryption
    #[arg(long)]
    overwrite_input: bool,

    /// Overwrite the output file if it already exists.
    #[arg(short = 'f', long = "force")]
    force: bool,

    #[command(flatten)]
    kdf: KdfArgs,
}

#[derive(Args, Debug)]
struct KeygenArgs {
    /// Directory to write the key pair into
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Read the private key passphrase from file
    #[arg(long = "key-passphrase-file")]
    key_passphrase_file: Option<PathBuf>,

    #[command(flatten)]
    kdf: KdfArgs,
}

#[derive(Args, Debug)]
struct KeyfileArgs {
    /// Where to write the keyfile
    #[arg(short = 'o', long = "out")]
    output: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.cmd {
        Command::Enc(a) => cmd_enc(a),
        Command::Dec(a) => cmd_dec(a),
        Command::Keygen(a) => cmd_keygen(a),
        Command::Keyfile(a) => cmd_keyfile(a),
    }
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_password(password_file: Option<&Path>, prompt: &str) -> Result<SecretString> {
    if let Some(path) = password_file {
        let mut s = String::new();
        fs::File::open(path)
            .and_then(|mut f| f.read_to_string(&mut s))
            .with_context(|| format!("reading {}", path.display()))?;

        let secret = SecretString::from(s.trim_end_matches(&['\r', '\n'][..]).to_owned());
        s.zeroize();
        Ok(secret)
    } else {
        let pw = rpassword::prompt_password(prompt)?;
        Ok(SecretString::from(pw))
    }
}

fn load_private(a: &SecretArgs, path: &Path, kdf: &KdfParams) -> Result<PrivateKey> {
    let passphrase = read_password(a.key_passphrase_file.as_deref(), "Key passphrase: ")?;
    load_private_key(path, &passphrase, kdf)
        .with_context(|| format!("loading private key {}", path.display()))
}

fn symmetric_credential(a: &SecretArgs) -> Result<Credential> {
    match &a.keyfile {
        Some(path) => {
            let digest =
                read_keyfile(path).with_context(|| format!("reading keyfile {}", path.display()))?;
            if a.password || a.password_file.is_some() {
                let pw = read_password(a.password_file.as_deref(), "Password: ")?;
                Ok(Credential::PasswordAndKeyfile(pw, digest))
            } else {
                Ok(Credential::Keyfile(digest))
            }
        }
        None => Ok(Credential::Password(read_password(
            a.password_file.as_deref(),
            "Password: ",
        )?)),
    }
}

fn cmd_enc(a: EncArgs) -> Result<()> {
    let kdf = a.kdf.params();
    let credential = if !a.recipients.is_empty() {
        let recipients = a
            .recipients
            .iter()
            .map(|r| load_public_key(r).with_context(|| format!("loading recipient key {r}")))
            .collect::<Result<Vec<_>>>()?;
        let sender = match &a.secret.private_key {
            Some(path) => Some(load_private(&a.secret, path, &kdf)?),
            None => None,
        };
        Credential::Recipients { sender, recipients }
    } else if let Some(path) = &a.secret.private_key {
        Credential::PrivateKey(load_private(&a.secret, path, &kdf)?)
    } else {
        symmetric_credential(&a.secret)?
    };

    let opts = EncryptOptions {
        kdf_params: kdf,
        chunk_size: a.chunk_size,
        obfuscate_names: a.obfuscate_names,
        overwrite_input: a.overwrite_input,
        force: a.force,
    };

    if a.input.is_dir() {
        let report = encrypt_directory(&a.input, &credential, &opts, &KeepNames)
            .with_context(|| "encryption failed")?;
        return finish_batch(&report);
    }

    let out = encrypt_file(&a.input, a.output.as_deref(), &credential, &opts)
        .with_context(|| "encryption failed")?;
    eprintln!("Wrote {}", out.display());
    Ok(())
}

fn cmd_dec(a: DecArgs) -> Result<()> {
    let kdf = a.kdf.params();
    let credential = match (&a.secret.private_key, &a.sender) {
        (Some(path), Some(sender)) => Credential::FromSender {
            recipient: load_private(&a.secret, path, &kdf)?,
            sender: load_public_key(sender).with_context(|| "loading sender key")?,
        },
        (Some(path), None) => Credential::PrivateKey(load_private(&a.secret, path, &kdf)?),
        (None, Some(_)) => anyhow::bail!("--sender needs --private-key"),
        (None, None) => symmetric_credential(&a.secret)?,
    };

    let opts = DecryptOptions {
        kdf_params: kdf,
        chunk_size: a.chunk_size,
        overwrite_input: a.overwrite_input,
        force: a.force,
    };

    if a.input.is_dir() {
        let report = decrypt_directory(&a.input, &credential, &opts, &KeepNames)
            .with_context(|| "decryption failed")?;
        return finish_batch(&report);
    }

    let out = decrypt_file(&a.input, a.output.as_deref(), &credential, &opts)
        .with_context(|| "decryption failed")?;
    eprintln!("Wrote {}", out.display());
    Ok(())
}

/// One line per file, then the summary. Fails if any file failed.
fn finish_batch(report: &BatchReport) -> Result<()> {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(out) => eprintln!("ok    {} -> {}", outcome.input.display(), out.display()),
            Err(e) => eprintln!("FAIL  {}: {e}", outcome.input.display()),
        }
    }
    eprintln!("{} of {} files succeeded", report.successful, report.total);
    let access = report
        .failures()
        .filter(|o| o.result.as_ref().is_err_and(SealFileError::is_file_access))
        .count();
    if access > 0 {
        eprintln!("{access} files could not be accessed; fix permissions and rerun");
    }
    if !report.is_complete() {
        anyhow::bail!("{} files failed", report.total - report.successful);
    }
    Ok(())
}

fn cmd_keygen(a: KeygenArgs) -> Result<()> {
    let passphrase = read_password(a.key_passphrase_file.as_deref(), "New key passphrase: ")?;
    let (private, _) = generate_key_pair()?;
    let (public_path, private_path) = save_key_pair(&a.dir, &private, &passphrase, &a.kdf.params())
        .with_context(|| "writing key pair")?;
    eprintln!("Wrote {}", public_path.display());
    eprintln!("Wrote {}", private_path.display());
    Ok(())
}

fn cmd_keyfile(a: KeyfileArgs) -> Result<()> {
    generate_keyfile(&a.output).with_context(|| format!("writing {}", a.output.display()))?;
    eprintln!("Wrote {}", a.output.display());
    Ok(())
}
