use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use oxiri::Iri;
use rdfa::{Diagnostic, HostLanguage, Options, RdfaParser, Severity, Version};

/// Extract RDF triples from RDFa-annotated markup and print them as Turtle.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// URL or file to read, or "-" for standard input.
    target: String,

    /// Base IRI; defaults to the target when the target is a URL.
    #[arg(long)]
    base: Option<String>,

    /// RDFa rule set to apply.
    #[arg(long, value_enum, default_value_t = RuleSet::Rdfa11)]
    rdfa: RuleSet,

    /// Host language profile of the input.
    #[arg(long, value_enum, default_value_t = Host::HeadBody)]
    host: Host,

    /// Stop at the first error instead of degrading.
    #[arg(long)]
    validate: bool,

    /// Rewrite recognized typed literals to their canonical form.
    #[arg(long)]
    canonicalize: bool,

    /// Maximum element nesting depth.
    #[arg(long, default_value_t = 128)]
    max_depth: usize,

    /// Also print informational processor messages to standard error.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum RuleSet {
    #[value(name = "1.0")]
    Rdfa10,
    #[value(name = "1.1")]
    Rdfa11,
}

#[derive(Clone, Copy, ValueEnum)]
enum Host {
    HeadBody,
    Generic,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let (input, discovered_base) = fetch(&args.target)?;
    let base = args
        .base
        .clone()
        .or(discovered_base)
        .ok_or("no base IRI available; pass --base")?;
    let base = Iri::parse(base).map_err(|e| format!("invalid base IRI: {e}"))?;

    let options = Options {
        version: match args.rdfa {
            RuleSet::Rdfa10 => Version::Rdfa10,
            RuleSet::Rdfa11 => Version::Rdfa11,
        },
        host_language: match args.host {
            Host::HeadBody => HostLanguage::HeadBody,
            Host::Generic => HostLanguage::Generic,
        },
        validate: args.validate,
        canonicalize: args.canonicalize,
        max_depth: args.max_depth,
        ..Options::default()
    };

    let verbose = args.verbose;
    let mut diagnostics = |diagnostic: Diagnostic| {
        let label = match diagnostic.severity {
            Severity::Info => {
                if !verbose {
                    return;
                }
                "info"
            }
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        eprintln!("{label}: [{}] {}", diagnostic.location, diagnostic.message);
    };

    let mut graph = oxrdf::Graph::new();
    RdfaParser::new(options)
        .parse_into(&input, base.clone(), &mut graph, Some(&mut diagnostics))
        .map_err(|e| e.to_string())?;

    let mut serializer = oxttl::TurtleSerializer::new()
        .with_base_iri(base.as_str())
        .map_err(|e| e.to_string())?;
    for (prefix, namespace) in rdfa::registered_prefixes() {
        // Prefixes picked up from the document may be relative; Turtle
        // cannot declare those.
        if Iri::parse(namespace.clone()).is_ok() {
            serializer = serializer
                .with_prefix(&prefix, &namespace)
                .map_err(|e| e.to_string())?;
        }
    }

    let mut locked_out = io::stdout().lock();
    let mut writer = serializer.for_writer(&mut locked_out);
    for triple in graph.iter() {
        writer.serialize_triple(triple).map_err(|e| e.to_string())?;
    }
    writer.finish().map_err(|e| e.to_string())?;

    Ok(())
}

/// Reads the target, returning the content and the base IRI the source
/// implies, if any.
fn fetch(target: &str) -> Result<(String, Option<String>), String> {
    if target == "-" {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| format!("stdin: {e}"))?;
        return Ok((input, None));
    }

    if let Ok(url) = url::Url::parse(target) {
        match url.scheme() {
            "http" | "https" => {
                let response = reqwest::blocking::get(url)
                    .and_then(|response| response.error_for_status())
                    .map_err(|e| e.to_string())?;
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok());
                if content_type.is_some_and(|ct| ct.starts_with("image/")) {
                    return Err(format!("{target}: not a markup document"));
                }
                // Redirects may have moved us; the final URL is the base.
                let final_url = response.url().to_string();
                let body = response.text().map_err(|e| e.to_string())?;
                return Ok((body, Some(final_url)));
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| format!("{target}: unusable file URL"))?;
                let input = fs::read_to_string(&path).map_err(|e| format!("{target}: {e}"))?;
                return Ok((input, Some(url.to_string())));
            }
            _ => {}
        }
    }

    let input = fs::read_to_string(target).map_err(|e| format!("{target}: {e}"))?;
    let base = fs::canonicalize(target)
        .ok()
        .and_then(|path| url::Url::from_file_path(path).ok())
        .map(|url| url.to_string());
    Ok((input, base))
}
