//! Minimal conversion: embed an XML invoice into a PDF with a custom
//! configuration and print the resulting sizes.
//!
//! Usage:
//!   cargo run --example convert_invoice -- invoice.pdf factur-x.xml 1001
//!   cargo run --example convert_invoice -- invoice.pdf factur-x.xml 1001 out.pdf

use pdfa3embed::{ConverterConfig, PdfA3Converter};
use std::{env, process};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 4 {
        eprintln!("Usage: {} <pdf_file> <xml_file> <sequence_no> [output_pdf]", args[0]);
        process::exit(2);
    }

    let sequence_no = args[3].as_str();
    let output = args
        .get(4)
        .cloned()
        .unwrap_or_else(|| format!("invoice_{sequence_no}_pdfa3.pdf"));

    let config = ConverterConfig {
        title: format!("Invoice {sequence_no}"),
        keywords: Some("invoice, factur-x".into()),
        max_attachment_size: Some(10 * 1024 * 1024),
        ..Default::default()
    };

    let metrics = PdfA3Converter::with_config(config)
        .convert_files(&args[1], &args[2], sequence_no, &output)
        .unwrap_or_else(|e| {
            eprintln!("✗ {e}");
            process::exit(if e.is_client_error() { 2 } else { 1 });
        });

    println!("✓ Wrote {output}");
    println!("    PDF in : {} bytes", metrics.original_pdf_size);
    println!("    XML    : {} bytes", metrics.xml_size);
    println!("    PDF out: {} bytes", metrics.pdf_a3_size);
}
