use async_trait::async_trait;
use netshell::config::Config;
use netshell::core::NetShellError;
use netshell::core::commands::{
    CommandFlags, CommandRegistry, Request, RequestContext, RequestOutcome, SessionAction,
    factory,
};
use netshell::core::state::ServerState;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct CountingRequest {
    calls: usize,
}

#[async_trait]
impl Request for CountingRequest {
    async fn execute(
        &mut self,
        _ctx: &RequestContext,
        args: &str,
    ) -> Result<RequestOutcome, NetShellError> {
        self.calls += 1;
        Ok(RequestOutcome::text(format!("{}:{}\n", self.calls, args)))
    }
}

fn context() -> RequestContext {
    let state = ServerState::initialize(Config::default()).unwrap();
    RequestContext::new(state, 1)
}

#[tokio::test]
async fn test_each_dispatch_gets_a_fresh_request() {
    let made = Arc::new(AtomicUsize::new(0));
    let counter = made.clone();
    let mut reg = CommandRegistry::new();
    reg.register(
        "count",
        &[],
        "Count",
        "Usage: count\n",
        CommandFlags::empty(),
        factory(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            CountingRequest::default()
        }),
    )
    .unwrap();

    let ctx = context();
    let first = reg.dispatch("count", "a", &ctx).await.unwrap();
    let second = reg.dispatch("count", "b", &ctx).await.unwrap();

    // Per-request state never leaks between dispatches.
    assert_eq!(first.output, "1:a\n");
    assert_eq!(second.output, "1:b\n");
    assert_eq!(made.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_aliases_resolve_to_primary() {
    let mut reg = CommandRegistry::new();
    reg.register(
        "count",
        &["c", "cnt"],
        "Count",
        "Usage: count\n",
        CommandFlags::empty(),
        factory(CountingRequest::default),
    )
    .unwrap();

    assert_eq!(reg.resolve("c").unwrap().name, "count");
    assert_eq!(reg.resolve("cnt").unwrap().name, "count");
    assert!(reg.resolve("counter").is_none());
}

#[tokio::test]
async fn test_duplicate_names_are_rejected() {
    let mut reg = CommandRegistry::new();
    reg.register(
        "count",
        &["c"],
        "Count",
        "",
        CommandFlags::empty(),
        factory(CountingRequest::default),
    )
    .unwrap();
    let err = reg
        .register(
            "cycle",
            &["c"],
            "Cycle",
            "",
            CommandFlags::empty(),
            factory(CountingRequest::default),
        )
        .unwrap_err();
    assert!(matches!(err, NetShellError::Internal(_)));
}

#[tokio::test]
async fn test_unknown_command_dispatch_fails() {
    let reg = CommandRegistry::new();
    let err = reg.dispatch("bogus", "", &context()).await.unwrap_err();
    assert_eq!(err, NetShellError::UnknownCommand("bogus".into()));
    assert_eq!(err.to_string(), "no such command: bogus");
}

#[tokio::test]
async fn test_close_session_flag_forces_close() {
    let mut reg = CommandRegistry::new();
    reg.register(
        "bye",
        &[],
        "Bye",
        "",
        CommandFlags::CLOSE_SESSION,
        factory(CountingRequest::default),
    )
    .unwrap();
    let descriptor = reg.resolve("bye").unwrap();
    assert!(!descriptor.keeps_session_open());

    let outcome = reg.dispatch("bye", "", &context()).await.unwrap();
    assert!(matches!(outcome.action, SessionAction::Close));
}

#[tokio::test]
async fn test_builtin_menu_hides_exit() {
    let ctx = context();
    let menu = ctx.state.commands.menu();

    assert!(menu.starts_with("Available commands:\n"));
    assert!(menu.contains("  help:"));
    assert!(menu.contains("  quit:"));
    assert!(menu.contains("  stats:"));
    assert!(menu.contains("  json:"));
    assert!(!menu.contains("exit"));
    assert!(ctx.state.commands.resolve("exit").unwrap().is_hidden());
}

#[tokio::test]
async fn test_builtin_exit_aliases() {
    let ctx = context();
    for word in ["exit", "q", ".", "\u{4}"] {
        let descriptor = ctx.state.commands.resolve(word).unwrap();
        assert_eq!(descriptor.name, "exit");
    }
}

#[tokio::test]
async fn test_help_for_unknown_command_fails() {
    let ctx = context();
    let err = ctx
        .state
        .commands
        .dispatch("help", "bogus", &ctx)
        .await
        .unwrap_err();
    assert_eq!(err, NetShellError::UnknownCommand("bogus".into()));

    let help = ctx
        .state
        .commands
        .dispatch("help", "q", &ctx)
        .await
        .unwrap();
    assert!(help.output.starts_with("Usage: exit"));
}

#[tokio::test]
async fn test_shell_commands_are_flagged() {
    let ctx = context();
    assert!(ctx.state.commands.resolve("json").unwrap().is_shell_command());
    assert!(ctx.state.commands.resolve("echo").unwrap().is_shell_command());
    assert!(!ctx.state.commands.resolve("help").unwrap().is_shell_command());
}

#[tokio::test]
async fn test_help_exit_is_exit_help_text() {
    let ctx = context();
    let help = ctx
        .state
        .commands
        .dispatch("help", "exit", &ctx)
        .await
        .unwrap();
    assert_eq!(help.output, netshell::core::commands::builtin::EXIT_HELP);
}

#[tokio::test]
async fn test_menu_lists_each_visible_command_once() {
    let ctx = context();
    let menu = ctx.state.commands.menu();
    for descriptor in ctx.state.commands.visible() {
        let label = format!("  {}:", descriptor.name);
        assert_eq!(
            menu.matches(&label).count(),
            1,
            "{} should appear exactly once",
            descriptor.name
        );
    }
}

#[tokio::test]
async fn test_loglevel_without_reload_handle_is_not_implemented() {
    let ctx = context();
    let err = ctx
        .state
        .commands
        .dispatch("loglevel", "debug", &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, NetShellError::NotImplemented(_)));
}
