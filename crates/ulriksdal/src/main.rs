#![forbid(unsafe_code)]

//! Ulriksdal CLI: sign, verify, encrypt and decrypt XML documents.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ulriksdal::core::registry;
use ulriksdal::core::{ns, Error, KeyDataClass};
use ulriksdal::enc::Decrypted;
use ulriksdal::keys::{CertType, Key, KeyFormat, KeysManager};
use ulriksdal::xml::{Document, Element};
use ulriksdal::{EncryptionContext, SignatureContext};

#[derive(Parser)]
#[command(
    name = "ulriksdal",
    about = "Ulriksdal - XML Security (XML-DSig, XML-Enc)",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (debug logging unless RUST_LOG says otherwise)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log every engine diagnostic as it is reported
    #[arg(long = "debug-trace", global = true)]
    debug_trace: bool,

    /// Characters per line of base64 output (0 disables wrapping)
    #[arg(long = "base64-line-size", global = true)]
    base64_line_size: Option<i64>,
}

/// Key material shared by every subcommand.
#[derive(Args)]
struct KeyArgs {
    /// Load private/public key or certificate (PEM or DER, auto-detected)
    #[arg(short = 'k', long)]
    key: Option<PathBuf>,

    /// Load key with a name (NAME:FILE)
    #[arg(short = 'K', long = "key-name")]
    key_name: Vec<String>,

    /// Password of an encrypted PKCS#8 key
    #[arg(long)]
    pwd: Option<String>,

    /// Load X.509 certificate (PEM or DER) as a key
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Load trusted CA certificate
    #[arg(long)]
    trusted: Vec<PathBuf>,

    /// Load untrusted intermediate certificate
    #[arg(long)]
    untrusted: Vec<PathBuf>,

    /// Load raw HMAC key (binary file)
    #[arg(long = "hmac-key")]
    hmac_key: Option<PathBuf>,

    /// Load raw AES key (binary file)
    #[arg(long = "aes-key")]
    aes_key: Option<PathBuf>,

    /// Load raw Triple-DES key (binary file)
    #[arg(long = "des-key")]
    des_key: Option<PathBuf>,

    /// Register additional ID attribute names
    #[arg(long = "id-attr")]
    id_attr: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a signed XML document
    Verify {
        /// Input XML file
        file: PathBuf,

        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Sign an XML template
    Sign {
        /// Template XML file (with empty DigestValue/SignatureValue)
        template: PathBuf,

        #[command(flatten)]
        keys: KeyArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decrypt an encrypted XML document
    Decrypt {
        /// Input encrypted XML file
        file: PathBuf,

        #[command(flatten)]
        keys: KeyArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encrypt data using an EncryptedData template
    Encrypt {
        /// Template XML file (EncryptedData with empty CipherValue)
        template: PathBuf,

        /// Binary data file to encrypt
        #[arg(long, conflicts_with = "xml")]
        data: Option<PathBuf>,

        /// XML document whose node is encrypted in place
        #[arg(long)]
        xml: Option<PathBuf>,

        /// ID of the node to encrypt (default: the root element)
        #[arg(long = "node-id", requires = "xml")]
        node_id: Option<String>,

        #[command(flatten)]
        keys: KeyArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List supported algorithms and key types
    Info,
}

fn main() {
    let cli = Cli::parse();
    install_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        ulriksdal::shutdown();
        process::exit(1);
    }
    ulriksdal::shutdown();
}

fn install_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), Error> {
    ulriksdal::init()?;
    ulriksdal::enable_debug_trace(cli.debug_trace);
    if let Some(size) = cli.base64_line_size {
        ulriksdal::set_base64_default_line_size(size)?;
    }

    match cli.command {
        Commands::Verify { file, keys } => cmd_verify(&file, &keys, cli.verbose),
        Commands::Sign {
            template,
            keys,
            output,
        } => cmd_sign(&template, &keys, output, cli.verbose),
        Commands::Decrypt { file, keys, output } => cmd_decrypt(&file, &keys, output, cli.verbose),
        Commands::Encrypt {
            template,
            data,
            xml,
            node_id,
            keys,
            output,
        } => cmd_encrypt(&template, data, xml, node_id, &keys, output, cli.verbose),
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

fn cmd_verify(file: &Path, keys: &KeyArgs, verbose: bool) -> Result<(), Error> {
    let doc = Document::parse_file(file)?;
    let signature = find(&doc, ns::node::SIGNATURE, ns::DSIG)?;

    let mut ctx = SignatureContext::new(Some(Arc::new(build_keys_manager(keys)?)));
    for attr in &keys.id_attr {
        ctx.add_id_attr(attr);
    }
    if verbose {
        eprintln!("Verifying: {}", file.display());
    }

    match ctx.verify(&signature) {
        Ok(()) => {
            println!("OK");
            Ok(())
        }
        Err(e) if e.is_verification_failure() => {
            eprintln!("INVALID: {e}");
            ulriksdal::shutdown();
            process::exit(1);
        }
        Err(e) => Err(e),
    }
}

fn cmd_sign(template: &Path, keys: &KeyArgs, output: Option<PathBuf>, verbose: bool) -> Result<(), Error> {
    let doc = Document::parse_file(template)?;
    let signature = find(&doc, ns::node::SIGNATURE, ns::DSIG)?;

    let mut ctx = SignatureContext::new(Some(Arc::new(build_keys_manager(keys)?)));
    for attr in &keys.id_attr {
        ctx.add_id_attr(attr);
    }
    if verbose {
        eprintln!("Signing: {}", template.display());
    }

    ctx.sign(&signature)?;
    write_output(output, doc.to_xml().as_bytes())
}

fn cmd_decrypt(file: &Path, keys: &KeyArgs, output: Option<PathBuf>, verbose: bool) -> Result<(), Error> {
    let doc = Document::parse_file(file)?;
    register_ids(&doc, &keys.id_attr);
    let encrypted = find(&doc, ns::node::ENCRYPTED_DATA, ns::ENC)?;

    let mut ctx = EncryptionContext::new(Some(Arc::new(build_keys_manager(keys)?)));
    if verbose {
        eprintln!("Decrypting: {}", file.display());
    }

    match ctx.decrypt(&encrypted)? {
        Decrypted::Element(_) => write_output(output, doc.to_xml().as_bytes()),
        Decrypted::Binary(data) => write_output(output, &data),
    }
}

fn cmd_encrypt(
    template: &Path,
    data: Option<PathBuf>,
    xml: Option<PathBuf>,
    node_id: Option<String>,
    keys: &KeyArgs,
    output: Option<PathBuf>,
    verbose: bool,
) -> Result<(), Error> {
    let template_doc = Document::parse_file(template)?;
    let encrypted = find(&template_doc, ns::node::ENCRYPTED_DATA, ns::ENC)?;
    let mut ctx = EncryptionContext::new(Some(Arc::new(build_keys_manager(keys)?)));

    match (data, xml) {
        (Some(data), _) => {
            if verbose {
                eprintln!("Encrypting: {}", data.display());
            }
            let path = data
                .to_str()
                .ok_or_else(|| Error::InvalidUri(format!("not a UTF-8 path: {}", data.display())))?;
            ctx.encrypt_uri(&encrypted, path)?;
            write_output(output, template_doc.to_xml().as_bytes())
        }
        (None, Some(xml)) => {
            if verbose {
                eprintln!("Encrypting: {}", xml.display());
            }
            let doc = Document::parse_file(&xml)?;
            register_ids(&doc, &keys.id_attr);
            let node = match &node_id {
                Some(id) => doc
                    .find_by_id(id)
                    .ok_or_else(|| Error::InvalidUri(format!("no element with ID {id:?}")))?,
                None => doc
                    .root_element()
                    .ok_or_else(|| Error::XmlStructure("document has no root element".into()))?,
            };
            ctx.encrypt_xml(&encrypted, &node)?;
            write_output(output, doc.to_xml().as_bytes())
        }
        (None, None) => Err(Error::Value("one of --data or --xml is required".into())),
    }
}

fn cmd_info() {
    println!("Ulriksdal - XML Security Library");
    let groups = [
        ("Canonicalization", registry::TransformUsage::C14N_METHOD),
        ("Reference transforms", registry::TransformUsage::DSIG_TRANSFORM),
        ("Digest algorithms", registry::TransformUsage::DIGEST_METHOD),
        ("Signature algorithms", registry::TransformUsage::SIGNATURE_METHOD),
        ("Encryption, key wrap and key transport", registry::TransformUsage::ENCRYPTION_METHOD),
    ];
    for (title, usage) in groups {
        println!();
        println!("{title}:");
        for desc in registry::transform::ALL.iter().filter(|d| d.usage.contains(usage)) {
            println!("  {:<16} {}", desc.name, desc.href.unwrap_or("-"));
        }
    }
    println!();
    println!("Key data:");
    for desc in registry::key_data::ALL {
        println!("  {}", desc.name);
    }
}

// ── Utility functions ────────────────────────────────────────────────

fn find(doc: &Document, local: &str, ns_uri: &str) -> Result<Element, Error> {
    doc.root_element()
        .and_then(|root| root.find_node(local, ns_uri))
        .ok_or_else(|| Error::MissingElement(format!("{local} in document")))
}

fn register_ids(doc: &Document, attrs: &[String]) {
    if attrs.is_empty() {
        return;
    }
    if let Some(root) = doc.root_element() {
        let names: Vec<&str> = attrs.iter().map(String::as_str).collect();
        root.add_ids(&names);
    }
}

fn write_output(path: Option<PathBuf>, data: &[u8]) -> Result<(), Error> {
    match path {
        Some(p) => std::fs::write(&p, data).map_err(Error::from),
        None => {
            use std::io::Write;
            std::io::stdout().write_all(data).map_err(Error::from)
        }
    }
}

/// PEM when the file looks like one, DER otherwise.
fn sniff_format(data: &[u8]) -> KeyFormat {
    let start = data.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(data.len());
    if data[start..].starts_with(b"-----BEGIN") {
        KeyFormat::Pem
    } else {
        KeyFormat::Der
    }
}

fn load_key(path: &Path, password: Option<&str>) -> Result<Key, Error> {
    let data = std::fs::read(path)?;
    Key::from_memory(&data, sniff_format(&data), password)
}

fn build_keys_manager(args: &KeyArgs) -> Result<KeysManager, Error> {
    let mut mgr = KeysManager::new();
    let password = args.pwd.as_deref();

    if let Some(path) = &args.key {
        mgr.add_key(&load_key(path, password)?)?;
    }

    for entry in &args.key_name {
        let (name, file) = entry
            .split_once(':')
            .ok_or_else(|| Error::Value(format!("invalid key-name format: {entry} (expected NAME:FILE)")))?;
        let key = load_key(Path::new(file), password)?;
        key.set_name(Some(name))?;
        mgr.add_key(&key)?;
    }

    if let Some(path) = &args.cert {
        mgr.add_key(&load_key(path, None)?)?;
    }

    for (paths, kind) in [(&args.trusted, CertType::Trusted), (&args.untrusted, CertType::Untrusted)] {
        for path in paths {
            let data = std::fs::read(path)?;
            let format = match sniff_format(&data) {
                KeyFormat::Pem => KeyFormat::CertPem,
                _ => KeyFormat::CertDer,
            };
            mgr.load_cert_from_memory(&data, format, kind)?;
        }
    }

    let binary = [
        (&args.hmac_key, KeyDataClass::Hmac),
        (&args.aes_key, KeyDataClass::Aes),
        (&args.des_key, KeyDataClass::Des),
    ];
    for (path, class) in binary {
        if let Some(path) = path {
            mgr.add_key(&Key::from_binary_file(class, path)?)?;
        }
    }

    tracing::debug!(keys = mgr.len(), "keys manager ready");
    Ok(mgr)
}
