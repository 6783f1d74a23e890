use base64::Engine;
use clap::Parser;
use rand::RngCore;

#[derive(Parser)]
#[command(name = "generate_jwt_secret", about = "Print a random signing secret for JWT_SECRET")]
struct Cli {
    /// Secret length in bytes
    #[arg(long, default_value_t = 32)]
    bytes: usize,

    /// Print only the .env line
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    if cli.bytes < 32 {
        eprintln!("Refusing to generate a secret shorter than 32 bytes (HS256 needs at least 256 bits)");
        std::process::exit(1);
    }

    let mut key = vec![0u8; cli.bytes];
    rand::thread_rng().fill_bytes(&mut key);

    let base64_key = base64::engine::general_purpose::STANDARD.encode(&key);

    if cli.quiet {
        println!("JWT_SECRET={}", base64_key);
        return;
    }

    println!("open-speech session secret");
    println!("==========================");
    println!();
    println!("Base64: {}", base64_key);
    println!("Hex:    {}", hex::encode(&key));
    println!();
    println!("Add this line to the server's .env file:");
    println!("JWT_SECRET={}", base64_key);
    println!();
    println!("Changing it signs every user out.");
}
