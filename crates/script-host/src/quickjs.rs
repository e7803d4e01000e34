//! QuickJS reference engine
//!
//! Drives user scripts through a generator protocol: the script defines
//! `function* start(sessionId)` and each run-cycle advances the generator by
//! one `next()`. Yielded values are JSON-stringified inside the context, so
//! nothing crosses the boundary as a live reference.

use std::sync::Arc;

use async_trait::async_trait;
use rquickjs::function::Func;
use rquickjs::{Context, Runtime};
use serde::Deserialize;

use crate::{
    EngineConfig, EngineFs, EngineInitError, Resumption, ScriptEngine, ScriptError, ScriptHandle,
};
use quay_protocol::SessionId;

/// Instantiates the generator once the script sources are evaluated
const BOOTSTRAP: &str = r#"
if (typeof globalThis.start !== "function") {
    throw new Error("script does not define a start(sessionId) entry point");
}
globalThis.__host_gen = globalThis.start(globalThis.__host_session_id);
"#;

/// Advances the generator one step and returns the outcome as JSON text
const STEP: &str = r#"
(function () {
    const raw = globalThis.__host_input;
    globalThis.__host_input = null;
    const input = raw === null || raw === undefined ? undefined : JSON.parse(raw);
    const step = globalThis.__host_gen.next(input);
    return JSON.stringify({
        done: step.done === true,
        value: step.value === undefined ? null : step.value,
    });
})()
"#;

#[derive(Debug, Deserialize)]
struct StepOutcome {
    done: bool,
    value: serde_json::Value,
}

/// QuickJS-backed [`ScriptEngine`]
pub struct QuickJsEngine {
    source: String,
    config: EngineConfig,
    fs: Arc<dyn EngineFs>,
}

impl QuickJsEngine {
    pub fn new(source: impl Into<String>, config: EngineConfig, fs: Arc<dyn EngineFs>) -> Self {
        Self {
            source: source.into(),
            config,
            fs,
        }
    }
}

#[async_trait]
impl ScriptEngine for QuickJsEngine {
    async fn initialise(&self) -> Result<(), EngineInitError> {
        // Bootstrap doubles as a compile check: the prelude and script
        // sources must evaluate in a fresh context before any session starts.
        let source = self.source.clone();
        let config = self.config.clone();
        let fs = self.fs.clone();

        tracing::info!("initialising script runtime");
        tokio::task::spawn_blocking(move || build_context(&source, &config, fs).map(|_| ()))
            .await
            .map_err(|err| EngineInitError::Bootstrap(err.to_string()))?
    }

    fn start(&self, session_id: &SessionId) -> Result<Box<dyn ScriptHandle>, EngineInitError> {
        let (runtime, context) = build_context(&self.source, &self.config, self.fs.clone())?;

        context
            .with(|ctx| -> Result<(), EngineInitError> {
                ctx.globals()
                    .set("__host_session_id", session_id.as_str())
                    .map_err(|err| EngineInitError::Start(err.to_string()))?;
                match ctx.eval::<(), _>(BOOTSTRAP) {
                    Ok(()) => Ok(()),
                    Err(err) => Err(EngineInitError::Start(caught_text(&ctx, err))),
                }
            })?;

        tracing::debug!(session_id = %session_id, "script session started");
        Ok(Box::new(QuickJsHandle {
            _runtime: runtime,
            context,
            done: false,
        }))
    }
}

/// One live script session: a context holding the instantiated generator
pub struct QuickJsHandle {
    _runtime: Runtime,
    context: Context,
    done: bool,
}

impl std::fmt::Debug for QuickJsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuickJsHandle")
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl ScriptHandle for QuickJsHandle {
    fn resume(&mut self, input: Option<serde_json::Value>) -> Result<Resumption, ScriptError> {
        if self.done {
            return Err(ScriptError::Completed);
        }

        let input_json = match input {
            Some(value) => Some(
                serde_json::to_string(&value)
                    .map_err(|err| ScriptError::Evaluation(err.to_string()))?,
            ),
            None => None,
        };

        let text = self.context.with(move |ctx| -> Result<String, ScriptError> {
            match input_json {
                Some(json) => ctx
                    .globals()
                    .set("__host_input", json)
                    .map_err(|err| ScriptError::Evaluation(err.to_string()))?,
                None => ctx
                    .eval::<(), _>("globalThis.__host_input = null;")
                    .map_err(|err| ScriptError::Evaluation(err.to_string()))?,
            }
            match ctx.eval::<String, _>(STEP) {
                Ok(text) => Ok(text),
                Err(err) => Err(ScriptError::Evaluation(caught_text(&ctx, err))),
            }
        })?;

        let outcome: StepOutcome =
            serde_json::from_str(&text).map_err(|err| ScriptError::BadYield(err.to_string()))?;

        if outcome.done {
            self.done = true;
            Ok(Resumption::Completed)
        } else {
            Ok(Resumption::Yielded(outcome.value))
        }
    }
}

/// Fresh runtime and context with the fs bindings, preludes, and the main
/// script evaluated
fn build_context(
    source: &str,
    config: &EngineConfig,
    fs: Arc<dyn EngineFs>,
) -> Result<(Runtime, Context), EngineInitError> {
    let runtime = Runtime::new().map_err(|err| EngineInitError::Bootstrap(err.to_string()))?;
    runtime.set_memory_limit(config.memory_limit);

    let context =
        Context::full(&runtime).map_err(|err| EngineInitError::Bootstrap(err.to_string()))?;

    context
        .with(|ctx| -> Result<(), rquickjs::Error> {
            let globals = ctx.globals();

            // fs namespace: scripts address mounted host files by path
            let fs_ns = rquickjs::Object::new(ctx.clone())?;

            let fs_read = fs.clone();
            let read_fn = Func::from(move |path: String| -> Option<String> {
                fs_read
                    .read(&path)
                    .ok()
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            });
            fs_ns.set("readText", read_fn)?;

            let fs_exists = fs.clone();
            let exists_fn = Func::from(move |path: String| -> bool { fs_exists.exists(&path) });
            fs_ns.set("exists", exists_fn)?;

            globals.set("fs", fs_ns)?;
            Ok(())
        })
        .map_err(|err| EngineInitError::Bootstrap(err.to_string()))?;

    // Preludes stand in for the runtime's package loading step
    for prelude in &config.preludes {
        eval_source(&context, prelude)?;
    }
    eval_source(&context, source)?;

    Ok((runtime, context))
}

fn eval_source(context: &Context, source: &str) -> Result<(), EngineInitError> {
    context.with(|ctx| match ctx.eval::<(), _>(source) {
        Ok(()) => Ok(()),
        Err(err) => Err(EngineInitError::Bootstrap(caught_text(&ctx, err))),
    })
}

/// Prefer the thrown value's message and stack over the generic
/// "exception generated" text
fn caught_text(ctx: &rquickjs::Ctx<'_>, err: rquickjs::Error) -> String {
    let caught = ctx.catch();
    if caught.is_undefined() || caught.is_null() {
        return err.to_string();
    }
    if let Some(obj) = caught.as_object() {
        let message: Option<String> = obj.get("message").ok();
        let stack: Option<String> = obj.get("stack").ok();
        if let Some(message) = message {
            return match stack {
                Some(stack) if !stack.is_empty() => format!("{message}\n{stack}"),
                _ => message,
            };
        }
    }
    if let Some(text) = caught.as_string().and_then(|s| s.to_string().ok()) {
        return text;
    }
    err.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryFs;
    use quay_protocol::FileBlob;

    const ECHO_SCRIPT: &str = r#"
        function* start(sessionId) {
            const reply = yield { type: "prompt", session: sessionId };
            yield { type: "echo", value: reply };
        }
    "#;

    fn engine(source: &str) -> QuickJsEngine {
        QuickJsEngine::new(source, EngineConfig::default(), Arc::new(MemoryFs::new()))
    }

    fn expect_yield(resumption: Resumption) -> quay_protocol::ScriptEvent {
        match resumption {
            Resumption::Yielded(event) => event,
            Resumption::Completed => panic!("expected a yield"),
        }
    }

    #[test]
    fn generator_yields_and_receives_input() {
        let engine = engine(ECHO_SCRIPT);
        let mut handle = engine.start(&SessionId::from("s-1")).unwrap();

        let first = expect_yield(handle.resume(None).unwrap());
        assert_eq!(first["type"], "prompt");
        assert_eq!(first["session"], "s-1");

        let second = expect_yield(handle.resume(Some(serde_json::json!("hello"))).unwrap());
        assert_eq!(second["value"], "hello");

        assert!(matches!(handle.resume(None).unwrap(), Resumption::Completed));
        assert!(matches!(handle.resume(None), Err(ScriptError::Completed)));
    }

    #[test]
    fn missing_entry_point_fails_start() {
        let engine = engine("const answer = 42;");
        let err = engine.start(&SessionId::from("s-1")).unwrap_err();
        assert!(err.to_string().contains("start(sessionId)"));
    }

    #[test]
    fn thrown_error_carries_message() {
        let engine = engine(r#"function* start() { throw new Error("boom"); }"#);
        let mut handle = engine.start(&SessionId::from("s-1")).unwrap();
        let err = handle.resume(None).unwrap_err();
        assert!(err.to_string().contains("boom"), "unexpected error: {err}");
    }

    #[test]
    fn script_reads_mounted_file() {
        let fs = Arc::new(MemoryFs::new());
        fs.mkdir("/file-input-0").unwrap();
        fs.mount(
            vec![FileBlob::new("notes.txt", b"hello file".to_vec())],
            "/file-input-0",
        )
        .unwrap();

        let engine = QuickJsEngine::new(
            r#"
            function* start() {
                const path = yield { type: "prompt" };
                yield { type: "contents", text: fs.readText(path), there: fs.exists(path) };
            }
            "#,
            EngineConfig::default(),
            fs,
        );
        let mut handle = engine.start(&SessionId::from("s-1")).unwrap();
        handle.resume(None).unwrap();

        let event = expect_yield(
            handle
                .resume(Some(serde_json::json!("/file-input-0/notes.txt")))
                .unwrap(),
        );
        assert_eq!(event["text"], "hello file");
        assert_eq!(event["there"], true);
    }

    #[test]
    fn prelude_definitions_are_visible_to_the_script() {
        let config = EngineConfig {
            preludes: vec!["globalThis.shout = (s) => s.toUpperCase();".to_owned()],
            ..EngineConfig::default()
        };
        let engine = QuickJsEngine::new(
            r#"function* start() { yield { word: shout("hi") }; }"#,
            config,
            Arc::new(MemoryFs::new()),
        );
        let mut handle = engine.start(&SessionId::from("s")).unwrap();
        let event = expect_yield(handle.resume(None).unwrap());
        assert_eq!(event["word"], "HI");
    }

    #[tokio::test]
    async fn initialise_validates_sources() {
        assert!(engine(ECHO_SCRIPT).initialise().await.is_ok());
        assert!(engine("this is not javascript").initialise().await.is_err());
    }
}
