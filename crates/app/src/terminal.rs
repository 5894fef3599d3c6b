use std::path::Path;

use applyx_chat::{
    AttachmentId, Composer, ComposerResult, DispatchOutcome, FileCandidate, PendingDispatch,
    Session, SessionError,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use snafu::ResultExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{AppResult, ReadInputSnafu, WriteOutputSnafu};

const HELP: &str = "\
commands:
  <text>            set the draft text and send it
  /draft <text>     set the draft text without sending
  /attach <path>    add a PDF file to the draft
  /remove <id>      drop a pending attachment
  /pending          show the draft and its attachments
  /send             send the current draft
  /transcript       show the conversation so far
  /quit             leave";

/// One parsed line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Draft(String),
    Attach(String),
    Remove(AttachmentId),
    Pending,
    Send,
    Transcript,
    Help,
    Quit,
    Empty,
    /// Malformed input, carrying the message shown to the user.
    Invalid(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Command::Say(line.to_string());
    };

    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (rest, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "attach" if argument.is_empty() => Command::Invalid("usage: /attach <path>".to_string()),
        "attach" => Command::Attach(argument.to_string()),
        "remove" => match argument.trim_start_matches('#').parse::<u64>() {
            Ok(raw) => Command::Remove(AttachmentId::new(raw)),
            Err(_) => Command::Invalid("usage: /remove <id>".to_string()),
        },
        "draft" => Command::Draft(argument.to_string()),
        "pending" => Command::Pending,
        "send" => Command::Send,
        "transcript" => Command::Transcript,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command '/{other}', try /help")),
    }
}

enum Event {
    Outcome(DispatchOutcome),
    Line(Option<String>),
}

/// Line-oriented front-end over a composer and a session.
///
/// Input keeps being read while a reply is pending, so the next draft can be
/// prepared in the meantime.
pub struct Terminal<W> {
    composer: Composer,
    session: Session,
    out: W,
}

impl<W> Terminal<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(composer: Composer, session: Session, out: W) -> Self {
        Self {
            composer,
            session,
            out,
        }
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Runs until `/quit` or end of input.
    ///
    /// At end of input a pending reply is still awaited and shown; `/quit`
    /// drops it.
    pub async fn run<R>(&mut self, input: R) -> AppResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut in_flight: Option<BoxFuture<'static, DispatchOutcome>> = None;
        let mut quit = false;

        let greeting = format!(
            "applyx ready ({} responder). Type a message, /attach <file.pdf> or /help.",
            self.session.responder().name()
        );
        self.write_line(greeting).await?;

        loop {
            let event = tokio::select! {
                biased;
                outcome = next_outcome(&mut in_flight) => Event::Outcome(outcome),
                line = lines.next_line() => Event::Line(
                    line.context(ReadInputSnafu { stage: "read-terminal-line" })?,
                ),
            };

            match event {
                Event::Outcome(outcome) => {
                    in_flight = None;
                    self.settle(outcome).await?;
                }
                Event::Line(None) => break,
                Event::Line(Some(line)) => {
                    let command = parse_command(&line);
                    if command == Command::Quit {
                        quit = true;
                        break;
                    }
                    if let Some(pending) = self.execute(command).await? {
                        in_flight = Some(pending.resolve().boxed());
                    }
                }
            }
        }

        if let Some(reply) = in_flight.take() {
            if quit {
                tracing::info!("leaving with a reply still pending");
            } else {
                let outcome = reply.await;
                self.settle(outcome).await?;
            }
        }

        Ok(())
    }

    async fn execute(&mut self, command: Command) -> AppResult<Option<PendingDispatch>> {
        match command {
            Command::Say(text) => {
                self.composer.set_text(text);
                return self.send().await;
            }
            Command::Send => return self.send().await,
            Command::Draft(text) => {
                self.composer.set_text(text);
                self.write_line("draft updated").await?;
            }
            Command::Attach(path) => self.attach(Path::new(&path)).await?,
            Command::Remove(id) => {
                let line = match self.composer.remove_attachment(id) {
                    Ok(removed) => format!("removed [{}] {}", removed.id(), removed.name()),
                    Err(error) => format!("! {error}"),
                };
                self.write_line(line).await?;
            }
            Command::Pending => self.show_pending().await?,
            Command::Transcript => self.show_transcript().await?,
            Command::Help => self.write_line(HELP).await?,
            Command::Invalid(message) => self.write_line(format!("! {message}")).await?,
            Command::Empty | Command::Quit => {}
        }

        Ok(None)
    }

    async fn send(&mut self) -> AppResult<Option<PendingDispatch>> {
        let submission = match self.composer.commit(&self.session.state()) {
            Ok(submission) => submission,
            Err(error) => {
                let line = if self.session.is_awaiting() && self.composer.has_content() {
                    format!("! {error} (draft saved)")
                } else {
                    format!("! {error}")
                };
                self.write_line(line).await?;
                return Ok(None);
            }
        };

        match self.session.submit(submission) {
            Ok(pending) => {
                let line = format!(
                    "waiting for a reply to dispatch {}",
                    pending.ticket().dispatch_id
                );
                self.write_line(line).await?;
                Ok(Some(pending))
            }
            Err(error) => {
                self.write_line(format!("! {error}")).await?;
                if let Some(submission) = error.into_submission() {
                    self.composer.restore(submission);
                }
                Ok(None)
            }
        }
    }

    async fn settle(&mut self, outcome: DispatchOutcome) -> AppResult<()> {
        let settled = self
            .session
            .settle(outcome)
            .map(|turn| turn.content().to_string());

        match settled {
            Ok(content) => self.write_line(format!("agent> {content}")).await,
            Err(error @ SessionError::DispatchFailed { .. }) => {
                self.write_line(format!("! {error}")).await?;
                self.write_line("your message stays in the transcript, send it again to retry")
                    .await
            }
            Err(error) => {
                tracing::warn!(error = %error, "discarded dispatch outcome");
                Ok(())
            }
        }
    }

    /// Checks type and size from metadata before reading the file.
    async fn attach(&mut self, path: &Path) -> AppResult<()> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => {
                return self
                    .write_line(format!("! {} is not a file", path.display()))
                    .await;
            }
            Err(error) => {
                return self
                    .write_line(format!("! cannot open {}: {error}", path.display()))
                    .await;
            }
        };

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let declared_type = mime_guess::from_path(path).first_raw();
        let declare = |candidate: FileCandidate| match declared_type {
            Some(declared_type) => candidate.with_declared_type(declared_type),
            None => candidate,
        };

        let probe = declare(FileCandidate::new(
            name.clone(),
            metadata.len(),
            Vec::<u8>::new(),
        ));
        if !self.composer.policy().verdict(&probe).is_accepted() {
            let rejected = self.composer.add_attachment(probe);
            return self.report_added(rejected).await;
        }

        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(error) => {
                return self
                    .write_line(format!("! cannot read {}: {error}", path.display()))
                    .await;
            }
        };
        let size_bytes = content.len() as u64;
        let added = self
            .composer
            .add_attachment(declare(FileCandidate::new(name, size_bytes, content)));
        self.report_added(added).await
    }

    async fn report_added(&mut self, added: ComposerResult<AttachmentId>) -> AppResult<()> {
        let line = match added {
            Ok(id) => match self
                .composer
                .pending()
                .iter()
                .find(|attachment| attachment.id() == id)
            {
                Some(attachment) => format!(
                    "attached [{id}] {} ({} bytes)",
                    attachment.name(),
                    attachment.size_bytes()
                ),
                None => format!("attached [{id}]"),
            },
            Err(error) => format!("! {error}"),
        };
        self.write_line(line).await
    }

    async fn show_pending(&mut self) -> AppResult<()> {
        let mut lines = Vec::new();
        if !self.composer.text().trim().is_empty() {
            lines.push(format!("draft: {}", self.composer.text()));
        }
        if self.composer.pending().is_empty() {
            lines.push("no pending attachments".to_string());
        }
        lines.extend(self.composer.pending().iter().map(|attachment| {
            format!(
                "[{}] {} ({} bytes)",
                attachment.id(),
                attachment.name(),
                attachment.size_bytes()
            )
        }));

        for line in lines {
            self.write_line(line).await?;
        }
        Ok(())
    }

    async fn show_transcript(&mut self) -> AppResult<()> {
        let mut lines = Vec::new();
        for turn in self.session.transcript() {
            lines.push(format!(
                "{} {}: {}",
                turn.id(),
                turn.role().as_str(),
                turn.content()
            ));
            if !turn.attachments().is_empty() {
                lines.push(format!("    attachments: {}", turn.attachments().join(", ")));
            }
        }
        if lines.is_empty() {
            lines.push("transcript is empty".to_string());
        }

        for line in lines {
            self.write_line(line).await?;
        }
        Ok(())
    }

    async fn write_line(&mut self, line: impl AsRef<str>) -> AppResult<()> {
        self.out
            .write_all(line.as_ref().as_bytes())
            .await
            .context(WriteOutputSnafu {
                stage: "write-terminal-line",
            })?;
        self.out.write_all(b"\n").await.context(WriteOutputSnafu {
            stage: "write-terminal-line",
        })?;
        self.out.flush().await.context(WriteOutputSnafu {
            stage: "flush-terminal-output",
        })
    }
}

/// Resolves the in-flight reply, or never when nothing is in flight.
async fn next_outcome(in_flight: &mut Option<BoxFuture<'static, DispatchOutcome>>) -> DispatchOutcome {
    match in_flight {
        Some(reply) => reply.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use applyx_chat::{AttachmentPolicy, Role};
    use applyx_llm::{PDF_MIME_TYPE, ScriptStep, ScriptedResponder};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

    use super::*;

    fn terminal(composer: Composer, responder: &ScriptedResponder) -> Terminal<Vec<u8>> {
        Terminal::new(composer, Session::new(Arc::new(responder.clone())), Vec::new())
    }

    async fn run(terminal: &mut Terminal<Vec<u8>>, input: &str) -> String {
        terminal.run(input.as_bytes()).await.unwrap();
        String::from_utf8(terminal.out.clone()).unwrap()
    }

    fn transcript(terminal: &Terminal<Vec<u8>>) -> Vec<(Role, String)> {
        terminal
            .session()
            .transcript()
            .iter()
            .map(|turn| (turn.role(), turn.content().to_string()))
            .collect()
    }

    async fn wait_for(output: &mut Lines<BufReader<DuplexStream>>, needle: &str) {
        while let Some(line) = output.next_line().await.unwrap() {
            if line.contains(needle) {
                return;
            }
        }
        panic!("output ended before '{needle}'");
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("  "), Command::Empty);
        assert_eq!(
            parse_command(" tailor my resume "),
            Command::Say("tailor my resume".to_string())
        );
        assert_eq!(
            parse_command("/attach  ~/cv final.pdf"),
            Command::Attach("~/cv final.pdf".to_string())
        );
        assert_eq!(
            parse_command("/REMOVE #3"),
            Command::Remove(AttachmentId::new(3))
        );
        assert_eq!(parse_command("/draft"), Command::Draft(String::new()));
        assert_eq!(parse_command("/exit"), Command::Quit);
        assert!(matches!(parse_command("/attach"), Command::Invalid(_)));
        assert!(matches!(parse_command("/remove resume"), Command::Invalid(_)));
        assert!(matches!(parse_command("/upload x"), Command::Invalid(message) if message.contains("/upload")));
    }

    #[tokio::test]
    async fn plain_text_is_sent_and_reply_printed() {
        let responder = ScriptedResponder::replying(["## Tailored resume\n- Rust"]);
        let mut terminal = terminal(Composer::new(), &responder);

        let output = run(&mut terminal, "Apply to the backend role\n").await;

        assert!(output.contains("waiting for a reply to dispatch #1"));
        assert!(output.contains("agent> ## Tailored resume\n- Rust"));
        assert_eq!(
            transcript(&terminal),
            [
                (Role::User, "Apply to the backend role".to_string()),
                (Role::Agent, "## Tailored resume\n- Rust".to_string()),
            ]
        );
        assert_eq!(responder.requests()[0].text, "Apply to the backend role");
    }

    #[tokio::test]
    async fn failed_reply_is_reported_and_next_message_still_sends() {
        let responder = ScriptedResponder::new([
            ScriptStep::Fail("backend offline".to_string()),
            ScriptStep::Reply("done".to_string()),
        ]);
        let mut terminal = terminal(Composer::new(), &responder);

        let output = run(&mut terminal, "first\nfirst again\n").await;

        assert!(output.contains("backend offline"));
        assert!(output.contains("send it again to retry"));
        assert_eq!(
            transcript(&terminal),
            [
                (Role::User, "first".to_string()),
                (Role::User, "first again".to_string()),
                (Role::Agent, "done".to_string()),
            ]
        );
        assert!(!terminal.session().is_awaiting());
    }

    #[tokio::test]
    async fn attach_accepts_pdfs_and_reports_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let resume = dir.path().join("resume.pdf");
        let notes = dir.path().join("notes.txt");
        std::fs::write(&resume, b"%PDF-1.7 resume").unwrap();
        std::fs::write(&notes, b"plain text").unwrap();

        let responder = ScriptedResponder::replying(["reviewed"]);
        let mut terminal = terminal(Composer::new(), &responder);
        let input = format!(
            "/attach {}\n/attach {}\n/attach {}\n/pending\n/send\n",
            resume.display(),
            notes.display(),
            dir.path().join("missing.pdf").display(),
        );

        let output = run(&mut terminal, &input).await;

        assert!(output.contains("attached [0] resume.pdf (15 bytes)"));
        assert!(output.contains("'notes.txt' is not a PDF document"));
        assert!(output.contains("! cannot open"));
        assert!(output.contains("[0] resume.pdf (15 bytes)"));
        assert!(output.contains("agent> reviewed"));

        let requests = responder.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].text, "");
        assert_eq!(requests[0].attachments.len(), 1);
        assert_eq!(requests[0].attachments[0].name, "resume.pdf");
        assert_eq!(requests[0].attachments[0].mime_type, PDF_MIME_TYPE);
        assert_eq!(&*requests[0].attachments[0].content, b"%PDF-1.7 resume");
        assert_eq!(
            terminal.session().transcript()[0].attachments(),
            ["resume.pdf".to_string()]
        );
    }

    #[tokio::test]
    async fn oversized_pdf_is_rejected_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let resume = dir.path().join("resume.PDF");
        std::fs::write(&resume, b"%PDF-1.7").unwrap();

        let responder = ScriptedResponder::default();
        let mut terminal = terminal(Composer::with_policy(AttachmentPolicy::new(8)), &responder);

        let output = run(&mut terminal, &format!("/attach {}\n", resume.display())).await;

        assert!(output.contains("'resume.PDF' is 8 bytes, files must be smaller than 8 bytes"));
        assert!(terminal.composer().pending().is_empty());
    }

    #[tokio::test]
    async fn remove_drops_a_pending_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let resume = dir.path().join("resume.pdf");
        std::fs::write(&resume, b"%PDF").unwrap();

        let responder = ScriptedResponder::default();
        let mut terminal = terminal(Composer::new(), &responder);
        let input = format!(
            "/attach {}\n/remove 0\n/remove 0\n/pending\n",
            resume.display()
        );

        let output = run(&mut terminal, &input).await;

        assert!(output.contains("removed [0] resume.pdf"));
        assert!(output.contains("attachment 0 is not pending"));
        assert!(output.contains("no pending attachments"));
        assert_eq!(responder.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_send_and_unknown_commands_are_explained() {
        let responder = ScriptedResponder::default();
        let mut terminal = terminal(Composer::new(), &responder);

        let output = run(&mut terminal, "/send\n/bogus\n/transcript\n").await;

        assert!(output.contains("draft has no text and no attachments"));
        assert!(output.contains("unknown command '/bogus'"));
        assert!(output.contains("transcript is empty"));
        assert_eq!(responder.call_count(), 0);
    }

    #[tokio::test]
    async fn quit_stops_reading_input() {
        let responder = ScriptedResponder::default();
        let mut terminal = terminal(Composer::new(), &responder);

        run(&mut terminal, "/quit\nnever sent\n").await;

        assert_eq!(responder.call_count(), 0);
        assert!(terminal.session().transcript().is_empty());
    }

    #[tokio::test]
    async fn draft_is_kept_while_reply_is_pending() {
        let responder = ScriptedResponder::default();
        let gate = responder.push_gated();
        responder.push(ScriptStep::Reply("second reply".to_string()));

        let (mut input, input_reader) = tokio::io::duplex(4096);
        let (output_writer, output_reader) = tokio::io::duplex(64 * 1024);
        let mut terminal = Terminal::new(
            Composer::new(),
            Session::new(Arc::new(responder.clone())),
            output_writer,
        );
        let running = tokio::spawn(async move {
            terminal
                .run(BufReader::new(input_reader))
                .await
                .map(|()| terminal)
        });
        let mut output = BufReader::new(output_reader).lines();

        input.write_all(b"first\n").await.unwrap();
        wait_for(&mut output, "waiting for a reply to dispatch #1").await;

        input.write_all(b"second\n").await.unwrap();
        wait_for(&mut output, "a reply is still pending (draft saved)").await;
        assert_eq!(responder.call_count(), 1);

        gate.send(Ok("first reply".to_string())).unwrap();
        wait_for(&mut output, "agent> first reply").await;

        input.write_all(b"/send\n").await.unwrap();
        wait_for(&mut output, "agent> second reply").await;
        drop(input);

        let terminal = running.await.unwrap().unwrap();
        let roles_and_contents = terminal
            .session()
            .transcript()
            .iter()
            .map(|turn| (turn.role(), turn.content().to_string()))
            .collect::<Vec<_>>();
        assert_eq!(
            roles_and_contents,
            [
                (Role::User, "first".to_string()),
                (Role::Agent, "first reply".to_string()),
                (Role::User, "second".to_string()),
                (Role::Agent, "second reply".to_string()),
            ]
        );
    }
}
