use argh::FromArgs;
use scanroute::{
    ImagePayload,
    server::{EXTRACT_ADDRESS_PATH, ExtractAddressRequest},
};
use std::path::{Path, PathBuf};

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;

#[derive(FromArgs)]
/// Scanroute client that sends a photo and prints the extracted address
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

fn mime_for(path: &Path) -> Result<&'static str, String> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| "Invalid file extension".to_string())?;

    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "png" => Ok("image/png"),
        "webp" => Ok("image/webp"),
        _ => Err(format!("Unsupported image format: {}", extension)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let mime_type = mime_for(&args.image_path)?;
    let image = ImagePayload::new(mime_type, std::fs::read(&args.image_path)?)?;

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let response = client
        .post(format!("http://{}{}", addr, EXTRACT_ADDRESS_PATH))
        .json(&ExtractAddressRequest {
            image: image.to_data_uri(),
        })
        .send()
        .await?;

    let status = response.status();
    let result = response.json::<serde_json::Value>().await?;
    println!("Status: {}", status);
    println!("Result: {}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
