use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use bhd5::{Binder, FormatGeneration, HashDictionary};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
struct ActionPack {
    /// Directory to pack
    #[arg(index = 1)]
    input: PathBuf,

    /// Output .bhd header path
    #[arg(index = 2)]
    header: PathBuf,

    /// Output .bdt data path. Defaults to the header path with its
    /// extension replaced by `.bdt`
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Format generation this archive targets
    #[arg(short, long, default_value = "EldenRing")]
    generation: FormatGeneration,

    /// Byte alignment each entry's padded region is rounded up to
    #[arg(short, long, default_value = "1")]
    alignment: i64,

    /// Omit the 16-byte DataHeader preamble
    #[arg(long, default_value = "false")]
    no_data_header: bool,

    /// Write the header in big-endian byte order
    #[arg(long, default_value = "false")]
    big_endian: bool,

    /// Data-file version tag embedded in the DataHeader
    #[arg(long, default_value = "")]
    version_tag: String,
}

#[derive(Parser, Debug)]
struct ActionUnpack {
    /// Input .bhd header path
    #[arg(index = 1)]
    header: PathBuf,

    /// Input .bdt data path. Defaults to the header path with its
    /// extension replaced by `.bdt`
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Output directory
    #[arg(index = 2)]
    output: PathBuf,

    /// Hash dictionary file (one path per line) used to recover real names
    /// for entries whose on-disk name is just their hash
    #[arg(long)]
    dictionary: Option<PathBuf>,

    /// PEM-encoded RSA public key; pass this when the header file is
    /// wrapped in the legacy RSA envelope instead of being a plain BHD5 header
    #[arg(long)]
    rsa_key: Option<PathBuf>,

    /// Skip entries that couldn't be named from the dictionary
    #[arg(long, default_value = "false")]
    skip_unknown_files: bool,

    /// Skip entries whose output path already exists
    #[arg(long, default_value = "false")]
    skip_existing_files: bool,
}

#[derive(Parser, Debug)]
struct ActionList {
    /// Input .bhd header path
    #[arg(index = 1)]
    header: PathBuf,

    /// Hash dictionary file (one path per line) used to recover real names
    #[arg(long)]
    dictionary: Option<PathBuf>,

    /// PEM-encoded RSA public key; pass this when the header file is
    /// wrapped in the legacy RSA envelope instead of being a plain BHD5 header
    #[arg(long)]
    rsa_key: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ActionInfo {
    /// Input .bhd header path
    #[arg(index = 1)]
    header: PathBuf,
}

#[derive(Parser, Debug)]
struct ActionGuessNames {
    /// Directory whose files should be renamed into guessed folders
    #[arg(index = 1)]
    dir: PathBuf,

    /// Recurse into subdirectories
    #[arg(short, long, default_value = "false")]
    recursive: bool,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Pack a directory into a BHD/BDT archive pair
    Pack(ActionPack),
    /// Unpack a BHD/BDT archive pair into a directory
    Unpack(ActionUnpack),
    /// List the entries of a BHD header
    List(ActionList),
    /// Print summary information about a BHD header
    Info(ActionInfo),
    /// Rename files in a directory by guessing their type
    GuessNames(ActionGuessNames),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Pack, unpack, and inspect BHD5 split archives")]
struct Args {
    #[command(subcommand)]
    action: Action,
}

fn main() -> bhd5::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match args.action {
        Action::Pack(action) => pack(action),
        Action::Unpack(action) => unpack(action),
        Action::List(action) => list(action),
        Action::Info(action) => info(action),
        Action::GuessNames(action) => guess_names(action),
    }
}

fn data_path_for(header: &std::path::Path, data: Option<PathBuf>) -> PathBuf {
    data.unwrap_or_else(|| header.with_extension("bdt"))
}

fn pack(args: ActionPack) -> bhd5::Result<()> {
    let data_path = data_path_for(&args.header, args.data);
    let binder = Binder::from_directory(args.generation, &args.input)?;

    let options = bhd5::pack::PackOptions {
        version_tag: args.version_tag,
        alignment: args.alignment,
        write_data_header: !args.no_data_header,
        big_endian: args.big_endian,
    };

    bhd5::pack::write_archive(&binder, &args.header, &data_path, &options)?;
    println!(
        "packed {} entries from {} into {} / {}",
        binder.entries.len(),
        args.input.display(),
        args.header.display(),
        data_path.display()
    );
    Ok(())
}

fn load_binder(
    header_path: &std::path::Path,
    dictionary: Option<&PathBuf>,
    rsa_key: Option<&PathBuf>,
) -> bhd5::Result<Binder> {
    let header_bytes = std::fs::read(header_path)?;
    let mut binder = match rsa_key {
        Some(rsa_key) => {
            let pem = std::fs::read_to_string(rsa_key)?;
            Binder::from_encrypted_header(&header_bytes, Some(&pem))?
        }
        None => Binder::from_encrypted_header(&header_bytes, None)?,
    };
    if let Some(dictionary) = dictionary {
        let dict = HashDictionary::from_path(File::open(dictionary)?, binder.generation.hash_is_64bit())?;
        binder.resolve_names(&dict);
    }
    Ok(binder)
}

fn unpack(args: ActionUnpack) -> bhd5::Result<()> {
    let data_path = data_path_for(&args.header, args.data);
    let mut binder = load_binder(&args.header, args.dictionary.as_ref(), args.rsa_key.as_ref())?;
    binder.skip_unknown_files = args.skip_unknown_files;
    binder.skip_existing_files = args.skip_existing_files;

    let mut data = File::open(&data_path)?;
    bhd5::unpack::unpack(&binder, &mut data, &args.output)?;
    println!(
        "unpacked {} entries from {} into {}",
        binder.entries.iter().filter(|e| !e.ignore).count(),
        data_path.display(),
        args.output.display()
    );
    Ok(())
}

fn list(args: ActionList) -> bhd5::Result<()> {
    let binder = load_binder(&args.header, args.dictionary.as_ref(), args.rsa_key.as_ref())?;
    for entry in &binder.entries {
        match &entry.sha_hash {
            Some(sha) => println!("{:#x} {} sha1:{}", entry.hash, entry.path, hex::encode(sha)),
            None => println!("{:#x} {}", entry.hash, entry.path),
        }
    }
    Ok(())
}

fn info(args: ActionInfo) -> bhd5::Result<()> {
    let mut header_reader = BufReader::new(File::open(&args.header)?);
    let (generation, big_endian, buckets) = bhd5::header::read_header(&mut header_reader)?;
    let entry_count: usize = buckets.iter().map(|b| b.len()).sum();
    println!("generation: {generation}");
    println!("big endian: {big_endian}");
    println!("bucket count: {}", buckets.len());
    println!("entry count: {entry_count}");
    Ok(())
}

fn guess_names(args: ActionGuessNames) -> bhd5::Result<()> {
    bhd5::guess::name::guess_names(&args.dir, args.recursive)?;
    println!("guessed names under {}", args.dir.display());
    Ok(())
}
