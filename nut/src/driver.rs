//! Runs one task end to end: prompt, model stream, routing, finalization.

use anyhow::{Context, Result};
use futures::{StreamExt, stream};
use tracing::{info, instrument, warn};

use crate::core::classifier::ClassifiedLine;
use crate::io::prompt::PromptBuilder;
use crate::io::provider::{FragmentStream, ModelProvider, ModelRequest};
use crate::io::router::{FileRouter, RoutePolicy, RouteSummary, SinkOpener};
use crate::io::transcript::Transcript;
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::task::Task;

/// Per-run settings shared by every task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    pub model: String,
    /// Extra attempts when the call fails before any fragment arrives.
    pub max_retries: u32,
    pub route: RoutePolicy,
}

/// What one task produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Classified lines, including code lines.
    pub lines: usize,
    pub route: RouteSummary,
    pub discarded_tail: Option<String>,
    /// The stream ended inside a code block.
    pub unterminated: bool,
    /// Model calls made, retries included.
    pub attempts: u32,
}

/// Drive `task` through `provider`, routing code into sinks from `opener`.
///
/// `observer` sees every classified node and its raw line before the router
/// does. Any open sink is flushed and closed before this returns, on success
/// and on failure.
#[instrument(skip_all, fields(model = %options.model, files = task.files().len()))]
pub async fn run_task<P, O, F>(
    task: &Task,
    provider: &P,
    opener: O,
    options: &TaskOptions,
    transcript: &Transcript,
    mut observer: F,
) -> Result<TaskOutcome>
where
    P: ModelProvider + ?Sized,
    O: SinkOpener + 'static,
    F: FnMut(&ClassifiedLine, &str),
{
    let context = task.context()?;
    let prompt = PromptBuilder::new()?.build(task.prompt(), &context)?;
    transcript.prompt(&prompt);

    let request = ModelRequest {
        model: options.model.clone(),
        prompt,
        system: task.system_prompt().map(str::to_string),
        max_retries: options.max_retries,
    };

    let result =
        stream_into_router(&request, provider, opener, options, transcript, &mut observer).await;
    match &result {
        Ok((outcome, attempts)) => info!(
            lines = outcome.lines,
            files = outcome.route.files.len(),
            attempts,
            "task finished"
        ),
        Err(err) => transcript.error(&format!("{err:#}")),
    }
    transcript.task_footer();

    let (outcome, attempts) = result?;
    Ok(TaskOutcome {
        lines: outcome.lines,
        route: outcome.route,
        discarded_tail: outcome.discarded_tail,
        unterminated: outcome.unterminated.is_some(),
        attempts,
    })
}

async fn stream_into_router<P, O, F>(
    request: &ModelRequest,
    provider: &P,
    opener: O,
    options: &TaskOptions,
    transcript: &Transcript,
    observer: &mut F,
) -> Result<(PipelineOutcome, u32)>
where
    P: ModelProvider + ?Sized,
    O: SinkOpener + 'static,
    F: FnMut(&ClassifiedLine, &str),
{
    let (mut fragments, first, attempts) = open_stream(provider, request).await?;
    transcript.response_header();

    let mut pipeline = Pipeline::new(FileRouter::new(opener, options.route));
    if let Some(fragment) = first {
        feed(&mut pipeline, &fragment, transcript, observer)?;
    }
    while let Some(item) = fragments.next().await {
        let fragment = item.context("model stream failed mid-response")?;
        feed(&mut pipeline, &fragment, transcript, observer)?;
    }
    let outcome = pipeline.finish()?;
    Ok((outcome, attempts))
}

/// Start the call, retrying only while nothing has been received.
///
/// Returns the live stream, its first fragment (`None` for an empty reply)
/// and the number of calls made.
async fn open_stream<P>(
    provider: &P,
    request: &ModelRequest,
) -> Result<(FragmentStream, Option<String>, u32)>
where
    P: ModelProvider + ?Sized,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut fragments = provider.stream(request);
        match fragments.next().await {
            Some(Ok(fragment)) => return Ok((fragments, Some(fragment), attempt)),
            None => {
                warn!("model returned an empty response");
                return Ok((stream::empty().boxed(), None, attempt));
            }
            Some(Err(err)) if attempt <= request.max_retries => {
                warn!(attempt, err = %format!("{err:#}"), "model call failed, retrying");
            }
            Some(Err(err)) => {
                return Err(err.context(format!("model call failed after {attempt} attempt(s)")));
            }
        }
    }
}

fn feed<F>(
    pipeline: &mut Pipeline,
    fragment: &str,
    transcript: &Transcript,
    observer: &mut F,
) -> Result<()>
where
    F: FnMut(&ClassifiedLine, &str),
{
    transcript.fragment(fragment);
    for notice in pipeline.push(fragment, observer)? {
        transcript.notice(&notice);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::test_support::{
        MemoryOpener, ScriptedProvider, SharedBuffer, failing_reply, ok_reply,
    };

    fn options() -> TaskOptions {
        TaskOptions {
            model: "llama3.1".to_string(),
            max_retries: 1,
            route: RoutePolicy::default(),
        }
    }

    async fn run_quiet(
        task: &Task,
        provider: &ScriptedProvider,
        opener: MemoryOpener,
        options: &TaskOptions,
    ) -> Result<TaskOutcome> {
        run_task(task, provider, opener, options, &Transcript::disabled(), |_, _| {}).await
    }

    #[tokio::test]
    async fn routes_streamed_code_into_announced_file() {
        let provider = ScriptedProvider::replying(&[
            "Here it is\n**a.",
            "js**\n```js\nconsole.",
            "log(1)\n```\n",
        ]);
        let opener = MemoryOpener::new();
        let mut kinds = Vec::new();

        let outcome = run_task(
            &Task::new("log one"),
            &provider,
            opener.clone(),
            &options(),
            &Transcript::disabled(),
            |node, _| kinds.push(node.kind()),
        )
        .await
        .expect("task");

        assert_eq!(opener.contents("a.js").as_deref(), Some("console.log(1)\n"));
        assert_eq!(
            kinds,
            vec![
                "paragraph",
                "marker",
                "code_block_start",
                "code_block_line",
                "code_block_end"
            ]
        );
        assert_eq!(outcome.route.files, vec![PathBuf::from("a.js")]);
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.unterminated);
    }

    #[tokio::test]
    async fn request_carries_prompt_model_and_system() {
        let provider = ScriptedProvider::replying(&["ok\n"]);
        let task = Task::new("write tests").with_system_prompt(Some("terse".to_string()));

        run_quiet(&task, &provider, MemoryOpener::new(), &options())
            .await
            .expect("task");

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "llama3.1");
        assert_eq!(requests[0].system.as_deref(), Some("terse"));
        assert!(requests[0].prompt.contains("### Intent\nwrite tests"));
        assert!(requests[0].prompt.contains("***src/main.js***"));
    }

    #[tokio::test]
    async fn failure_before_first_fragment_is_retried_once() {
        let provider = ScriptedProvider::new(vec![
            failing_reply("connection refused"),
            ok_reply(&["**b.rs**\n```rust\nfn b() {}\n```\n"]),
        ]);
        let opener = MemoryOpener::new();

        let outcome = run_quiet(&Task::new("b"), &provider, opener.clone(), &options())
            .await
            .expect("task");

        assert_eq!(provider.calls(), 2);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(opener.contents("b.rs").as_deref(), Some("fn b() {}\n"));
    }

    #[tokio::test]
    async fn second_failure_fails_the_task() {
        let provider = ScriptedProvider::new(vec![
            failing_reply("connection refused"),
            failing_reply("connection reset"),
        ]);

        let err = run_quiet(&Task::new("b"), &provider, MemoryOpener::new(), &options())
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 2);
        assert!(format!("{err:#}").contains("connection reset"));
    }

    #[tokio::test]
    async fn zero_retries_fails_on_first_error() {
        let provider = ScriptedProvider::new(vec![failing_reply("down"), ok_reply(&["never\n"])]);
        let opts = TaskOptions {
            max_retries: 0,
            ..options()
        };

        let result = run_quiet(&Task::new("b"), &provider, MemoryOpener::new(), &opts).await;

        assert!(result.is_err());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn mid_stream_failure_is_not_retried_and_flushes_sink() {
        let provider = ScriptedProvider::new(vec![
            vec![
                Ok("**c.py**\n```py\nprint(1)\n".to_string()),
                Err("connection reset".to_string()),
            ],
            ok_reply(&["unused\n"]),
        ]);
        let opener = MemoryOpener::new();

        let err = run_quiet(&Task::new("c"), &provider, opener.clone(), &options())
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("mid-response"));
        assert_eq!(provider.calls(), 1);
        assert_eq!(opener.contents("c.py").as_deref(), Some("print(1)\n"));
        assert_eq!(opener.close_count(), 1);
    }

    #[tokio::test]
    async fn stream_ending_inside_block_closes_sink() {
        let provider = ScriptedProvider::replying(&["**d.sh**\n```sh\necho hi\n"]);
        let opener = MemoryOpener::new();

        let outcome = run_quiet(&Task::new("d"), &provider, opener.clone(), &options())
            .await
            .expect("task");

        assert!(outcome.unterminated);
        assert_eq!(opener.contents("d.sh").as_deref(), Some("echo hi\n"));
        assert_eq!(opener.close_count(), 1);
    }

    #[tokio::test]
    async fn empty_reply_is_a_successful_empty_task() {
        let provider = ScriptedProvider::new(vec![Vec::new()]);
        let outcome = run_quiet(&Task::new("e"), &provider, MemoryOpener::new(), &options())
            .await
            .expect("task");
        assert_eq!(outcome.lines, 0);
        assert_eq!(provider.calls(), 1);
    }

    /// Ends immediately and panics if polled again, as non-fused streams may.
    struct EndsOnce {
        ended: bool,
    }

    impl futures::Stream for EndsOnce {
        type Item = Result<String>;

        fn poll_next(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Self::Item>> {
            assert!(!self.ended, "polled after completion");
            self.ended = true;
            std::task::Poll::Ready(None)
        }
    }

    struct SilentProvider;

    impl ModelProvider for SilentProvider {
        fn stream(&self, _request: &ModelRequest) -> FragmentStream {
            EndsOnce { ended: false }.boxed()
        }
    }

    #[tokio::test]
    async fn finished_empty_stream_is_not_polled_again() {
        let outcome = run_task(
            &Task::new("e"),
            &SilentProvider,
            MemoryOpener::new(),
            &options(),
            &Transcript::disabled(),
            |_, _| {},
        )
        .await
        .expect("task");
        assert_eq!(outcome.lines, 0);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn transcript_records_prompt_fragments_and_notices() {
        let provider = ScriptedProvider::replying(&["**a.js**\n", "```js\nx\n```\n"]);
        let buffer = SharedBuffer::new();

        run_task(
            &Task::new("make a"),
            &provider,
            MemoryOpener::new(),
            &options(),
            &Transcript::to_writer(buffer.clone()),
            |_, _| {},
        )
        .await
        .expect("task");

        let log = buffer.contents();
        assert!(log.starts_with("## Prompt\n### Intent\nmake a\n"));
        assert!(log.contains(
            "## Response\n**a.js**\n\n<!-- Writing to: a.js -->\n```js\nx\n```\n"
        ));
        assert!(log.ends_with("\n\n"));
    }
}
