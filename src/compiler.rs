use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Serialize;

use crate::derive::GeneratedOutput;
use crate::error::{CompilerError, ConfigError};
use crate::source::SourceFile;

/// Imports the Twirl compiler adds to every generated file.
pub const DEFAULT_IMPORTS: &[&str] = &[
    "_root_.play.twirl.api.TwirlFeatureImports._",
    "_root_.play.twirl.api.TwirlHelperImports._",
    "_root_.play.twirl.api.Html",
    "_root_.play.twirl.api.JavaScript",
    "_root_.play.twirl.api.Txt",
    "_root_.play.twirl.api.Xml",
];

/// Everything the compiler needs to turn one template into generated source.
#[derive(Debug)]
pub struct TemplateInput<'a> {
    pub source: &'a SourceFile,
    /// Where the result will be written and the name it must declare.
    pub output: &'a GeneratedOutput,
    /// Decoded template body.
    pub content: &'a str,
    pub formatter_type: &'a str,
    pub format_extension: &'a str,
    pub imports: &'a [String],
    pub constructor_annotations: &'a [String],
    pub strict: bool,
}

/// The template compiler. Generation must be a pure function of its input so that
/// recompiling an unchanged template yields identical bytes.
pub trait TemplateCompiler: Send + Sync {
    /// Imports merged into the configuration once at startup.
    fn default_imports(&self) -> Vec<String> {
        DEFAULT_IMPORTS.iter().map(|s| (*s).to_owned()).collect()
    }

    /// Generate source text for one template.
    fn generate(&self, input: &TemplateInput<'_>) -> Result<String, CompilerError>;
}

/// Request written as JSON to the compiler process's stdin.
#[derive(Debug, Serialize)]
struct CompileRequest<'a> {
    source_file: PathBuf,
    relative_path: &'a str,
    output_file: &'a PathBuf,
    qualified_name: String,
    package: String,
    type_name: &'a str,
    formatter_type: &'a str,
    format_extension: &'a str,
    imports: &'a [String],
    constructor_annotations: &'a [String],
    encoding: &'static str,
    strict: bool,
    content: &'a str,
}

/// Runs an external compiler program once per template.
///
/// Each invocation is its own process, so a crashing or leaking compiler cannot affect
/// other templates or the driver. The request goes to stdin as JSON; the generated source
/// is read from stdout. A non-zero exit rejects the template with stderr as the message.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandCompiler {
    pub fn new(argv: &[String]) -> Result<Self, ConfigError> {
        let (program, args) = argv.split_first().ok_or(ConfigError::MissingCompiler)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            working_dir: None,
        })
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl TemplateCompiler for CommandCompiler {
    fn generate(&self, input: &TemplateInput<'_>) -> Result<String, CompilerError> {
        let request = CompileRequest {
            source_file: input.source.path(),
            relative_path: input.source.relative_path(),
            output_file: &input.output.path,
            qualified_name: input.output.qualified_name(),
            package: input.output.name.package_name(),
            type_name: &input.output.name.type_name,
            formatter_type: input.formatter_type,
            format_extension: input.format_extension,
            imports: input.imports,
            constructor_annotations: input.constructor_annotations,
            encoding: input.output.encoding.name(),
            strict: input.strict,
            content: input.content,
        };
        let payload =
            serde_json::to_vec(&request).map_err(|e| CompilerError::Protocol(e.to_string()))?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        let spawn_err = |source| CompilerError::Spawn {
            program: self.program.clone(),
            source,
        };
        let mut child = command.spawn().map_err(spawn_err)?;

        // Feed stdin from a separate thread so a chatty compiler cannot deadlock on a full
        // stdout pipe while we are still writing.
        let stdin = child.stdin.take();
        let (output, written) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(&payload),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (output, written)
        });
        let output = output.map_err(spawn_err)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            let message = if stderr.is_empty() {
                format!("compiler exited with {}", output.status)
            } else {
                stderr
            };
            return Err(CompilerError::Rejected { message });
        }
        // A broken pipe only means the compiler stopped reading early.
        if let Err(err) = written
            && err.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(CompilerError::Protocol(format!("failed to send template: {err}")));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| CompilerError::Protocol("compiler output is not valid UTF-8".to_owned()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::derive::derive_output;
    use std::path::Path;

    fn sh(script: &str) -> CommandCompiler {
        CommandCompiler::new(&["sh".to_owned(), "-c".to_owned(), script.to_owned()]).unwrap()
    }

    fn generate_with(compiler: &CommandCompiler, content: &str) -> Result<String, CompilerError> {
        let source = SourceFile::new("/src", "a/b/c.scala.html").unwrap();
        let output = derive_output(source.relative_path(), encoding_rs::UTF_8, Path::new("/out")).unwrap();
        let imports = vec!["views.html._".to_owned()];
        compiler.generate(&TemplateInput {
            source: &source,
            output: &output,
            content,
            formatter_type: "play.twirl.api.HtmlFormat",
            format_extension: "html",
            imports: &imports,
            constructor_annotations: &[],
            strict: false,
        })
    }

    #[test]
    fn sends_request_as_json_and_reads_stdout() {
        let generated = generate_with(&sh("cat"), "@(name: String)\nHello @name").unwrap();
        let request: serde_json::Value = serde_json::from_str(&generated).unwrap();
        assert_eq!(request["package"], "a.b.html");
        assert_eq!(request["type_name"], "c");
        assert_eq!(request["formatter_type"], "play.twirl.api.HtmlFormat");
        assert_eq!(request["encoding"], "UTF-8");
        assert_eq!(request["imports"][0], "views.html._");
        assert_eq!(request["content"], "@(name: String)\nHello @name");
    }

    #[test]
    fn non_zero_exit_rejects_with_stderr() {
        let err = generate_with(&sh("echo 'unexpected token' >&2; exit 3"), "@{").unwrap_err();
        assert!(matches!(err, CompilerError::Rejected { message } if message == "unexpected token"));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let compiler = CommandCompiler::new(&["/nonexistent/twirl-compiler".to_owned()]).unwrap();
        assert!(matches!(generate_with(&compiler, ""), Err(CompilerError::Spawn { .. })));
    }

    #[test]
    fn empty_command_is_a_config_error() {
        assert!(matches!(CommandCompiler::new(&[]), Err(ConfigError::MissingCompiler)));
    }
}
