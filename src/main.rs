//! CLI tool that converts a PDF into PDF/A-3 with an embedded XML invoice.
//!
//! Thin host around the pdfa3embed library: reads both inputs from disk,
//! writes the converted document, and optionally reads it back to verify.

use pdfa3embed::{ConversionMetrics, OutputInspector, PdfA3Converter, Result, SequenceNo};
use std::path::{Path, PathBuf};
use std::{env, process};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program_name = args.first().map(String::as_str).unwrap_or("pdfa3embed");

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage(program_name);
        process::exit(0);
    }

    let verify = args.iter().any(|a| a == "--verify");
    let positional: Vec<&str> = args
        .iter()
        .skip(1)
        .filter(|a| *a != "--verify")
        .map(String::as_str)
        .collect();

    if !(3..=4).contains(&positional.len()) {
        print_usage(program_name);
        process::exit(2);
    }

    let pdf_path = Path::new(positional[0]);
    let xml_path = Path::new(positional[1]);
    let sequence_no = SequenceNo::from(positional[2]);
    let output_path = positional
        .get(3)
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(pdf_path, &sequence_no));

    match run_conversion(pdf_path, xml_path, sequence_no, &output_path, verify) {
        Ok(()) => println!("\n✅ Conversion completed successfully!"),
        Err(e) => {
            eprintln!("\n❌ Error: {}", e);
            process::exit(1);
        }
    }
}

fn print_usage(program_name: &str) {
    println!("📄 pdfa3embed - PDF/A-3 Conversion with Embedded XML");
    println!();
    println!("USAGE:");
    println!("    {} <pdf_file> <xml_file> <sequence_no> [output_pdf] [--verify]", program_name);
    println!();
    println!("ARGUMENTS:");
    println!("    <pdf_file>      PDF document to convert");
    println!("    <xml_file>      XML payload to embed (e.g. a Factur-X / ZUGFeRD invoice)");
    println!("    <sequence_no>   Invoice number; the payload is stored as invoice_<sequence_no>.xml");
    println!("    [output_pdf]    Output path (default: invoice_<sequence_no>_pdfa3.pdf next to the input)");
    println!();
    println!("OPTIONS:");
    println!("    --verify        Read the output back and report conformance and attachments");
    println!("    -h, --help      Show this help message");
    println!();
    println!("EXAMPLES:");
    println!("    {} invoice.pdf factur-x.xml 1001", program_name);
    println!("    {} invoice.pdf factur-x.xml 1001 out.pdf --verify", program_name);
    println!();
    println!("Set RUST_LOG=debug for conversion details.");
}

fn default_output_path(pdf_path: &Path, sequence_no: &SequenceNo) -> PathBuf {
    let filename = format!("invoice_{sequence_no}_pdfa3.pdf");
    match pdf_path.parent() {
        Some(dir) => dir.join(filename),
        None => PathBuf::from(filename),
    }
}

fn run_conversion(
    pdf_path: &Path,
    xml_path: &Path,
    sequence_no: SequenceNo,
    output_path: &Path,
    verify: bool,
) -> Result<()> {
    println!("🔄 Converting: {}", pdf_path.display());
    println!("📎 Embedding:  {} as {}", xml_path.display(), sequence_no.attachment_filename());
    println!("💾 Output:     {}", output_path.display());
    println!("{}", "─".repeat(60));

    let metrics = PdfA3Converter::new().convert_files(pdf_path, xml_path, sequence_no, output_path)?;
    print_metrics(&metrics);

    if verify {
        verify_output(output_path)?;
    }

    Ok(())
}

fn print_metrics(metrics: &ConversionMetrics) {
    println!("📊 Sizes:");
    println!("   • Original PDF: {}", format_bytes(metrics.original_pdf_size));
    println!("   • XML payload:  {}", format_bytes(metrics.xml_size));
    println!("   • PDF/A-3:      {}", format_bytes(metrics.pdf_a3_size));
}

fn verify_output(output_path: &Path) -> Result<()> {
    println!("\n🔍 Verifying output...");
    let inspector = OutputInspector::from_path(output_path)?;

    print!("🔖 Conformance... ");
    match inspector.conformance_level() {
        Some(level) if inspector.is_pdfa3() => println!("✅ {}", level),
        Some(level) => println!("⚠️  {} declared", level),
        None => println!("⚠️  no PDF/A identification in XMP"),
    }

    let missing = inspector.missing_catalog_keys()?;
    if missing.is_empty() {
        println!("📋 Catalog... ✅ complete");
    } else {
        println!("📋 Catalog... ⚠️  missing {}", missing.join(", "));
    }

    println!("📄 Pages: {}", inspector.page_count());

    for (i, file) in inspector.associated_files()?.iter().enumerate() {
        println!("\n📎 Associated file #{}: {}", i + 1, file.filename);
        println!("   📏 Size: {}", format_bytes(file.data.len()));
        if let Some(ref mime_type) = file.metadata.mime_type {
            println!("   🏷️  MIME Type: {}", mime_type);
        }
        if let Some(ref relationship) = file.metadata.relationship {
            println!("   🔗 Relationship: {}", relationship);
        }
        println!(
            "   🔐 Checksum: {}",
            if file.checksum_matches() { "✅ matches" } else { "❌ mismatch" }
        );
    }

    Ok(())
}

fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
