use clap::Parser;
use std::path::PathBuf;

const DEFAULT_PROGRAM: &str = "pdfside-docx";

#[derive(Parser)]
#[command(
    name = "pdfside-docx",
    about = "Convert PDF files to DOCX",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Args {
    /// Input PDF file
    #[arg(allow_hyphen_values = true)]
    input: PathBuf,
    /// Output DOCX file, created or overwritten
    #[arg(allow_hyphen_values = true)]
    output: PathBuf,
}

fn program_name() -> String {
    std::env::args_os()
        .next()
        .map(PathBuf::from)
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| DEFAULT_PROGRAM.to_string())
}

fn usage() -> ! {
    println!("Usage: {} <input_pdf> <output_docx>", program_name());
    std::process::exit(1);
}

fn main() {
    env_logger::init();

    // Counted before clap so a literal `--` is not swallowed as the end of options.
    let argc = std::env::args_os().len();
    if argc != 3 {
        log::debug!("expected 2 arguments, got {}", argc.saturating_sub(1));
        usage();
    }

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            log::debug!("argument error: {e}");
            usage();
        }
    };

    match pdfside_docx::convert_pdf_to_docx(&args.input, &args.output) {
        Ok(()) => println!(
            "Successfully converted {} to {}",
            args.input.display(),
            args.output.display()
        ),
        Err(e) => {
            println!("Error converting {}: {e}", args.input.display());
            std::process::exit(1);
        }
    }
}
