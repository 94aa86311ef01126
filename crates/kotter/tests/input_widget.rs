//! End-to-end input widget behavior: typing, editing keys, completion,
//! change rejection, and the input policy errors.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kotter::{
    Completions, InputOptions, KotterError, Session, TestTerminal, TestTerminalHandle,
};

fn test_session() -> (kotter::SessionBuilder, TestTerminalHandle) {
    let (terminal, handle) = TestTerminal::new();
    (Session::builder().terminal(Box::new(terminal)), handle)
}

/// Type a script of raw input after the section has settled in.
fn type_later(handle: &TestTerminalHandle, script: impl FnOnce(&TestTerminalHandle) + Send + 'static) {
    let handle = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        script(&handle);
    });
}

async fn with_timeout(fut: impl Future<Output = kotter::Result<()>>) {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("test timed out")
        .unwrap();
}

#[tokio::test]
async fn typed_text_is_entered() {
    let (builder, handle) = test_session();
    let entered = Arc::new(Mutex::new(String::new()));
    let captured = Arc::clone(&entered);

    type_later(&handle, |h| {
        h.send_text("hi");
        h.press_enter();
    });

    with_timeout(builder.run(|s| async move {
        s.section(|scope| {
            scope.text("> ");
            scope.input();
        })
        .run_until_input_entered(move |scope| async move {
            scope.on_input_entered(move |entry| {
                *captured.lock().unwrap() = entry.input.clone();
            });
            Ok(())
        })
        .await
    }))
    .await;

    assert_eq!(entered.lock().unwrap().as_str(), "hi");
    assert!(handle.output().contains("hi"));
}

#[tokio::test]
async fn editing_keys_follow_cursor_rules() {
    let (builder, handle) = test_session();
    let entered = Arc::new(Mutex::new(String::new()));
    let captured = Arc::clone(&entered);

    type_later(&handle, |h| {
        h.send_text("abc");
        h.press_left();
        h.press_left();
        h.press_backspace();
        h.send_text("x");
        h.press_end();
        h.press_enter();
    });

    with_timeout(builder.run(|s| async move {
        s.section(|scope| scope.input())
            .run_until_input_entered(move |scope| async move {
                scope.on_input_entered(move |entry| {
                    *captured.lock().unwrap() = entry.input.clone();
                });
                Ok(())
            })
            .await
    }))
    .await;

    assert_eq!(entered.lock().unwrap().as_str(), "xbc");
}

#[tokio::test]
async fn boundary_keys_are_noops() {
    let (builder, handle) = test_session();
    let entered = Arc::new(Mutex::new(String::new()));
    let captured = Arc::clone(&entered);

    type_later(&handle, |h| {
        h.press_backspace(); // empty widget: nothing to delete
        h.send_text("ok");
        h.press_delete(); // cursor at end: nothing ahead
        h.press_enter();
    });

    with_timeout(builder.run(|s| async move {
        s.section(|scope| scope.input())
            .run_until_input_entered(move |scope| async move {
                scope.on_input_entered(move |entry| {
                    *captured.lock().unwrap() = entry.input.clone();
                });
                Ok(())
            })
            .await
    }))
    .await;

    assert_eq!(entered.lock().unwrap().as_str(), "ok");
}

#[tokio::test]
async fn right_at_end_accepts_completion() {
    let (builder, handle) = test_session();
    let entered = Arc::new(Mutex::new(String::new()));
    let captured = Arc::clone(&entered);

    type_later(&handle, |h| {
        h.send_text("he");
        h.press_right();
        h.press_enter();
    });

    with_timeout(builder.run(|s| async move {
        s.section(|scope| {
            scope.input_with(
                InputOptions::new().completer(Arc::new(Completions::new(["hello", "help"]))),
            );
        })
        .run_until_input_entered(move |scope| async move {
            scope.on_input_entered(move |entry| {
                *captured.lock().unwrap() = entry.input.clone();
            });
            Ok(())
        })
        .await
    }))
    .await;

    assert_eq!(entered.lock().unwrap().as_str(), "hello");
}

#[tokio::test]
async fn change_callbacks_can_reject() {
    let (builder, handle) = test_session();
    let entered = Arc::new(Mutex::new(String::new()));
    let captured = Arc::clone(&entered);

    type_later(&handle, |h| {
        h.send_text("a1b2");
        h.press_enter();
    });

    with_timeout(builder.run(|s| async move {
        s.section(|scope| scope.input())
            .run_until_input_entered(move |scope| async move {
                scope.on_input_changed(|change| {
                    if change.input.chars().any(|c| c.is_ascii_digit()) {
                        change.reject_input();
                    }
                });
                scope.on_input_entered(move |entry| {
                    *captured.lock().unwrap() = entry.input.clone();
                });
                Ok(())
            })
            .await
    }))
    .await;

    assert_eq!(entered.lock().unwrap().as_str(), "ab");
}

#[tokio::test]
async fn rejected_enter_keeps_section_running() {
    let (builder, handle) = test_session();
    let entered = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&entered);

    type_later(&handle, |h| {
        h.press_enter(); // rejected: empty
        h.send_text("go");
        h.press_enter(); // accepted
    });

    with_timeout(builder.run(|s| async move {
        s.section(|scope| scope.input())
            .run_until_input_entered(move |scope| async move {
                scope.on_input_entered(move |entry| {
                    captured.lock().unwrap().push(entry.input.clone());
                    if entry.input.is_empty() {
                        entry.reject_input();
                    }
                });
                Ok(())
            })
            .await
    }))
    .await;

    assert_eq!(*entered.lock().unwrap(), ["", "go"]);
}

#[tokio::test]
async fn clear_input_empties_the_widget() {
    let (builder, handle) = test_session();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);

    type_later(&handle, |h| {
        h.send_text("first");
        h.press_enter();
        h.send_text("q");
    });

    with_timeout(builder.run(|s| async move {
        s.section(|scope| scope.input())
            .run_until_signal(move |scope| async move {
                let stop = scope.clone();
                let input_probe = scope.clone();
                scope.on_input_entered(move |entry| {
                    captured.lock().unwrap().push(entry.input.clone());
                    entry.clear_input();
                });
                scope.on_key_pressed(move |pressed| {
                    // After the clear, typing `q` lands in an empty widget.
                    if pressed.key == kotter::Key::Q
                        && input_probe.get_input().as_deref() == Some("q")
                    {
                        stop.signal();
                    }
                });
                Ok(())
            })
            .await
    }))
    .await;

    assert_eq!(*seen.lock().unwrap(), ["first"]);
}

#[tokio::test]
async fn set_and_get_input_are_programmatic() {
    let (builder, _handle) = test_session();

    with_timeout(builder.run(|s| async move {
        s.section(|scope| scope.input())
            .run_with(|scope| async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                assert_eq!(scope.get_input().as_deref(), Some(""));
                scope.set_input("preset");
                assert_eq!(scope.get_input().as_deref(), Some("preset"));
                Ok(())
            })
            .await
    }))
    .await;
}

#[tokio::test]
async fn input_twice_in_one_pass_is_a_policy_error() {
    let (builder, _handle) = test_session();

    let result = builder
        .run(|s| async move {
            s.section(|scope| {
                scope.input();
                scope.input();
            })
            .run()
            .await
        })
        .await;

    assert!(matches!(result, Err(KotterError::InvalidInputContext(_))));
}

#[tokio::test]
async fn input_inside_aside_is_a_policy_error() {
    let (builder, _handle) = test_session();

    let result = builder
        .run(|s| async move {
            s.section(|scope| scope.text_line("body"))
                .run_with(|scope| async move {
                    scope.aside(|aside| aside.input());
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(())
                })
                .await
        })
        .await;

    assert!(matches!(result, Err(KotterError::InvalidInputContext(_))));
}

#[tokio::test]
async fn initial_text_seeds_the_widget() {
    let (builder, handle) = test_session();
    let entered = Arc::new(Mutex::new(String::new()));
    let captured = Arc::clone(&entered);

    type_later(&handle, |h| {
        h.send_text("!");
        h.press_enter();
    });

    with_timeout(builder.run(|s| async move {
        s.section(|scope| {
            scope.input_with(InputOptions::new().initial_text("pre"));
        })
        .run_until_input_entered(move |scope| async move {
            scope.on_input_entered(move |entry| {
                *captured.lock().unwrap() = entry.input.clone();
            });
            Ok(())
        })
        .await
    }))
    .await;

    assert_eq!(entered.lock().unwrap().as_str(), "pre!");
}
