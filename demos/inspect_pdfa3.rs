//! Read a PDF back and report what a PDF/A-3 validator would look at first:
//! the XMP identification, the catalog keys and the associated files.
//!
//! Usage:
//!   cargo run --example inspect_pdfa3 -- invoice_1001_pdfa3.pdf
//!   cargo run --example inspect_pdfa3 -- invoice_1001_pdfa3.pdf --dump

use pdfa3embed::OutputInspector;
use std::{env, process};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <pdf_file> [--dump]", args[0]);
        process::exit(2);
    }

    let dump = args.iter().any(|a| a == "--dump");

    let inspector = OutputInspector::from_path(&args[1]).unwrap_or_else(|e| {
        eprintln!("Error loading PDF: {e}");
        process::exit(1);
    });

    println!("Inspecting: {} ({} page(s))", args[1], inspector.page_count());

    match inspector.conformance_level() {
        Some(level) => println!("✓ {level}"),
        None => println!("⚠ No PDF/A identification"),
    }

    match inspector.missing_catalog_keys() {
        Ok(missing) if missing.is_empty() => println!("✓ Catalog complete"),
        Ok(missing) => println!("⚠ Catalog missing: {}", missing.join(", ")),
        Err(e) => println!("✗ {e}"),
    }

    let names = inspector.embedded_file_names().unwrap_or_default();
    println!("✓ {} name tree entr(ies): {}", names.len(), names.join(", "));

    let files = inspector.associated_files().unwrap_or_else(|e| {
        eprintln!("✗ {e}");
        process::exit(1);
    });

    for (i, file) in files.iter().enumerate() {
        println!("\n  Associated file #{}", i + 1);
        println!("    Name     : {}", file.filename);
        println!("    Size     : {} bytes (declared {:?})", file.data.len(), file.metadata.size);
        println!("    Checksum : {}", if file.checksum_matches() { "ok" } else { "MISMATCH" });
        if let Some(ref mime) = file.metadata.mime_type {
            println!("    MIME     : {mime}");
        }
        if let Some(ref date) = file.metadata.modification_date {
            println!("    Date     : {date}");
        }
        if dump && file.metadata.is_xml() {
            println!("{}", String::from_utf8_lossy(&file.data));
        }
    }
}
