use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use uvcam::output::{self, PngWriter};
use uvcam::sdk::mock::{MockCamera, MockSdk};
use uvcam::sdk::{DeviceSdk, DeviceSelector, V4lSdk};
use uvcam::{CameraControl, Compression, DriverConfig, ImageMode, ParamId, StreamRequest};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Camera serial number (takes precedence over --product-id)
    #[arg(long, global = true)]
    serial: Option<String>,

    /// USB product id, hexadecimal
    #[arg(long, global = true, value_parser = parse_hex)]
    product_id: Option<u16>,

    /// Video device index (/dev/videoN)
    #[arg(short, long, global = true, default_value_t = 0)]
    device: usize,

    /// Use the built-in mock camera instead of real hardware
    #[arg(long, global = true)]
    mock: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List connected cameras
    List,
    /// Show the ranked camera format catalog
    Formats,
    /// Print the device report
    Info {
        /// 0: SDK only, 1: device and stream, 2: also the catalog
        #[arg(long, default_value_t = 1)]
        details: u32,
    },
    /// Capture frames to PNG files
    Capture(CaptureArgs),
}

#[derive(clap::Args, Debug)]
struct CaptureArgs {
    #[arg(long, value_enum, default_value_t = ModeArg::Single)]
    mode: ModeArg,

    /// Frames to capture in multiple mode
    #[arg(long, default_value_t = 5)]
    count: u64,

    /// Duration of a continuous capture
    #[arg(long, default_value_t = 5.0)]
    seconds: f64,

    /// Catalog entry to apply before capturing
    #[arg(long, conflicts_with = "compression")]
    format: Option<i64>,

    /// Stream encoding, when not using a catalog entry
    #[arg(long, value_enum)]
    compression: Option<CompressionArg>,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 480)]
    height: u32,

    #[arg(long, default_value_t = 30)]
    fps: i32,

    /// Output directory
    #[arg(short, long, default_value = "frames")]
    output: PathBuf,

    /// Keep the configured layout even if frames do not match it
    #[arg(long)]
    no_auto_adjust: bool,

    /// Maximum number of buffers in flight (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_buffers: usize,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ModeArg {
    Single,
    Multiple,
    Continuous,
}

impl From<ModeArg> for ImageMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Single => ImageMode::Single,
            ModeArg::Multiple => ImageMode::Multiple,
            ModeArg::Continuous => ImageMode::Continuous,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum CompressionArg {
    Mjpeg,
    Uncompressed,
    Rgb,
    Yuyv,
    Uyvy,
    Gray8,
    Gray16,
}

impl From<CompressionArg> for Compression {
    fn from(compression: CompressionArg) -> Self {
        match compression {
            CompressionArg::Mjpeg => Compression::Mjpeg,
            CompressionArg::Uncompressed => Compression::Uncompressed,
            CompressionArg::Rgb => Compression::Rgb,
            CompressionArg::Yuyv => Compression::Yuyv,
            CompressionArg::Uyvy => Compression::Uyvy,
            CompressionArg::Gray8 => Compression::Gray8,
            CompressionArg::Gray16 => Compression::Gray16,
        }
    }
}

fn parse_hex(value: &str) -> Result<u16, String> {
    u16::from_str_radix(value.trim_start_matches("0x"), 16).map_err(|err| err.to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let selector = match (&args.serial, args.product_id) {
        (None, None) => DeviceSelector::Index(args.device),
        (serial, product_id) => DeviceSelector::from_serial_or_product(
            serial.as_deref().unwrap_or_default(),
            product_id.unwrap_or_default(),
        ),
    };
    let sdk: Box<dyn DeviceSdk> = if args.mock {
        tracing::info!("Using mock camera");
        Box::new(MockSdk::single(
            MockCamera::new().with_frame_period(Duration::from_millis(33)),
        ))
    } else {
        Box::new(V4lSdk::new())
    };
    let config = DriverConfig {
        selector,
        ..DriverConfig::default()
    };

    match args.command {
        Command::List => list(sdk.as_ref()),
        Command::Formats => formats(sdk, config),
        Command::Info { details } => info(sdk, config, details),
        Command::Capture(capture_args) => capture(sdk, config, &capture_args),
    }
}

fn list(sdk: &dyn DeviceSdk) -> Result<()> {
    let devices = sdk.enumerate().context("Failed to enumerate cameras")?;
    if devices.is_empty() {
        println!("No cameras found");
    }
    for device in devices {
        println!("{device}");
    }
    Ok(())
}

fn connect(sdk: Box<dyn DeviceSdk>, config: DriverConfig, sink: output::SharedSink) -> Result<CameraControl> {
    let mut control = CameraControl::new(sdk, config, sink);
    control.connect().context("Failed to connect to camera")?;
    Ok(control)
}

fn formats(sdk: Box<dyn DeviceSdk>, config: DriverConfig) -> Result<()> {
    let (sink, _rx) = output::ChannelSink::new();
    let control = connect(sdk, config, output::shared(sink))?;
    for (index, entry) in control.catalog().slots().iter().enumerate() {
        println!("[{index}] {entry}");
    }
    Ok(())
}

fn info(sdk: Box<dyn DeviceSdk>, config: DriverConfig, details: u32) -> Result<()> {
    let (sink, _rx) = output::ChannelSink::new();
    let control = connect(sdk, config, output::shared(sink))?;
    control
        .report(&mut io::stdout().lock(), details)
        .context("Failed to write report")?;
    Ok(())
}

fn capture(sdk: Box<dyn DeviceSdk>, mut config: DriverConfig, args: &CaptureArgs) -> Result<()> {
    config.auto_adjust = !args.no_auto_adjust;
    config.max_buffers = args.max_buffers;

    let writer = PngWriter::new(&args.output, "frame")?;
    let mut control = connect(sdk, config, output::shared(writer))?;

    if let Some(index) = args.format {
        control.write_int(ParamId::CameraFormat, index)?;
        control.write_int(ParamId::ApplyFormat, 1)?;
    } else if let Some(compression) = args.compression {
        control.configure_stream(StreamRequest {
            compression: compression.into(),
            width: args.width,
            height: args.height,
            frame_rate_hz: args.fps,
        })?;
    }

    let mode = ImageMode::from(args.mode);
    tracing::info!("Capturing {} ({} mode)", control.stream_request(), mode);
    control.acquire(mode, args.count)?;

    match mode {
        ImageMode::Continuous => {
            thread::sleep(Duration::from_secs_f64(args.seconds.max(0.0)));
            control.stop()?;
        }
        ImageMode::Single | ImageMode::Multiple => {
            let frames = if mode == ImageMode::Single { 1 } else { args.count };
            let period = 1.0 / f64::from(args.fps.max(1));
            let timeout = Duration::from_secs_f64(frames as f64 * period * 4.0 + 10.0);
            if !control.wait_until_idle(timeout) {
                tracing::warn!("Timed out waiting for {} frame(s)", frames);
                control.stop()?;
            }
        }
    }

    let session = control.session();
    tracing::info!(
        "Captured {} frame(s) ({} received) into {}",
        session.frames_delivered,
        session.frames_received,
        args.output.display()
    );
    control.disconnect()?;
    Ok(())
}
