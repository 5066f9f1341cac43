use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use super::*;
use crate::config::PythonVersion;
use crate::test_support::{drain, framed_root, options, params, recording_chain, reply, writes};

type Rx = UnboundedReceiver<ConductorEvent>;

fn unframed_root(params: ConductorParams) -> (SharedChain, Rx, NodeId) {
	let (chain, rx) = recording_chain(options());
	let id = chain.lock().add_conductor(params, None).unwrap();
	(chain, rx, id)
}

fn current(chain: &SharedChain, id: NodeId) -> Option<Command> {
	chain.lock().current_command(id).cloned()
}

fn line(chain: &SharedChain, id: NodeId, text: &str) {
	let mut guard = chain.lock();
	let depth = guard.depth(id);
	guard.handle_line(id, text, depth);
}

fn aborts(events: &[ConductorEvent]) -> Vec<String> {
	events
		.iter()
		.filter_map(|event| match event {
			ConductorEvent::Abort { reason, .. } => Some(reason.clone()),
			_ => None,
		})
		.collect()
}

type Captured = Arc<Mutex<Option<(Vec<u8>, i32)>>>;

fn capture() -> (Captured, crate::context::JobCallback) {
	let slot: Captured = Arc::default();
	let sink = Arc::clone(&slot);
	(slot, Box::new(move |output: Vec<u8>, status: i32| *sink.lock() = Some((output, status))))
}

// ── A. Queue ──

#[test]
fn commands_are_written_one_at_a_time_in_order() {
	let (chain, mut rx) = recording_chain(options());
	let id = framed_root(&chain, 42);
	{
		let mut chain = chain.lock();
		chain.eval(id, "first");
		chain.eval(id, "second");
		assert_eq!(chain.state(id), StateKind::WillExecute);
		assert_eq!(chain.queued_commands(id), vec![Command::Eval(crate::command::b64(b"second"))]);
	}
	let first = Command::Eval(crate::command::b64(b"first")).serialize(128);
	assert_eq!(writes(&mut rx), vec![format!("{first}\n")]);

	reply(&chain, id, &[], 0);
	let second = Command::Eval(crate::command::b64(b"second")).serialize(128);
	assert_eq!(writes(&mut rx), vec![format!("{second}\n")]);
	reply(&chain, id, &[], 0);
	assert_eq!(chain.lock().state(id), StateKind::Ground);
}

#[test]
fn high_priority_goes_to_the_front() {
	let (chain, _rx) = recording_chain(options());
	let id = framed_root(&chain, 42);
	let mut chain = chain.lock();
	chain.eval(id, "busy");
	chain.register_process(id, 1);
	let _reply = chain.framer_file(id, crate::command::FileSubcommand::Stat { path: b"/".to_vec() }, true);
	let queued = chain.queued_commands(id);
	assert!(matches!(queued[0], Command::FramerFile(_)));
	assert_eq!(queued[1], Command::FramerRegister(1));
}

#[test]
fn without_a_delegate_everything_is_aborted() {
	let shared = ConductorChain::new(options(), None);
	let mut chain = shared.lock();
	let id = chain.add_conductor(params("host"), None).unwrap();
	let mut pending = chain.framer_file(id, crate::command::FileSubcommand::Mkdir { path: b"/x".to_vec() }, false);
	assert_eq!(pending.try_recv().unwrap(), (String::new(), -1));
	assert_eq!(chain.state(id), StateKind::Ground);
	assert!(chain.queued_commands(id).is_empty());
}

#[test]
fn second_queued_poll_is_declined() {
	let (chain, _rx) = recording_chain(options());
	let id = framed_root(&chain, 42);
	let mut chain = chain.lock();
	chain.eval(id, "busy");
	assert!(chain.poll(id, Box::new(|_: Vec<u8>| {})));
	assert!(!chain.poll(id, Box::new(|_: Vec<u8>| {})));
	assert_eq!(chain.queued_commands(id), vec![Command::FramerPoll]);
}

#[test]
fn poll_output_is_joined_with_newlines() {
	let (chain, _rx) = recording_chain(options());
	let id = framed_root(&chain, 42);
	let output = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&output);
	chain.lock().poll(id, Box::new(move |data: Vec<u8>| *sink.lock() = data));
	reply(&chain, id, &["a", "b"], 0);
	assert_eq!(*output.lock(), b"a\nb".to_vec());
}

#[test]
fn unexpected_input_in_ground_is_tolerated() {
	let (chain, mut rx) = recording_chain(options());
	let id = framed_root(&chain, 42);
	reply(&chain, id, &["stray"], 0);
	assert_eq!(chain.lock().state(id), StateKind::Ground);
	assert!(drain(&mut rx).is_empty());
}

// ── B. Bootstrap ──

fn bootstrap_params() -> ConductorParams {
	ConductorParams {
		vars_to_send: [("LANG".to_string(), "C".to_string())].into(),
		initial_directory: Some("/srv".into()),
		..params("user@example.com")
	}
}

#[test]
fn bootstrap_discovers_then_frames() {
	let registry = ConductorRegistry::new();
	let (chain, mut rx) = recording_chain(options().with_registry(Arc::clone(&registry)));
	let id = chain.lock().add_conductor(bootstrap_params(), None).unwrap();

	chain.lock().start(id);
	assert_eq!(writes(&mut rx), vec![format!("{}\n", Command::GetShell.serialize(128))]);

	reply(&chain, id, &["/bin/bash\n/home/user\nGNU bash, version 5.2"], 0);
	assert_eq!(chain.lock().shell(id), Some("/bin/bash"));
	assert_eq!(
		current(&chain, id),
		Some(Command::SetEnv {
			key: "LANG".into(),
			value: "C".into()
		})
	);
	assert_eq!(chain.lock().queued_commands(id), vec![Command::Cd("/srv".into()), Command::PythonVersion]);

	reply(&chain, id, &[], 0);
	reply(&chain, id, &[], 0);
	assert_eq!(current(&chain, id), Some(Command::PythonVersion));
	reply(&chain, id, &["Python 3.11.4"], 0);

	let source = ConductorConfig::default().framer_source(0);
	assert_eq!(current(&chain, id), Some(Command::RunPython(source.clone())));
	reply(&chain, id, &[], 0);
	let written = writes(&mut rx);
	assert!(written.contains(&format!("{source}\nEOF\n\n")));
	assert!(matches!(current(&chain, id), Some(Command::FramerSave(saved)) if saved["dcsID"] == "dcs" && saved["sshargs"] == "user@example.com"));

	reply(&chain, id, &[], 0);
	assert_eq!(current(&chain, id), Some(Command::FramerRun("uname -a".into())));
	reply(&chain, id, &["77"], 0);
	assert_eq!(current(&chain, id), Some(Command::FramerRun("echo $HOME".into())));
	reply(&chain, id, &["78"], 0);
	assert_eq!(current(&chain, id), Some(Command::FramerGetenv("PATH".into())));
	reply(&chain, id, &["/usr/bin:/bin"], 0);
	assert_eq!(
		current(&chain, id),
		Some(Command::FramerLogin {
			cwd: "/srv".into(),
			args: Vec::new()
		})
	);
	assert_eq!(chain.lock().background_job_pids(id), vec![77, 78]);

	drain(&mut rx);
	reply(&chain, id, &["1234"], 0);
	let events = drain(&mut rx);
	assert!(events.contains(&ConductorEvent::SendInitialText { node: id }));
	assert!(events.contains(&ConductorEvent::StopQueueingInput { node: id }));
	assert_eq!(current(&chain, id), Some(Command::FramerAutopoll));

	let mut guard = chain.lock();
	assert_eq!(guard.framed_pid(id), Some(1234));
	assert_eq!(guard.environment_variable(id, "PATH"), Some("/usr/bin:/bin"));
	assert_eq!(registry.connected_hosts(), vec![SshIdentity::new("example.com", Some("user".into()), None)]);

	guard.handle_side_channel_output(id, "Linux box 6.1", 77, 1, 0);
	guard.handle_terminate(id, 77, 0, 0);
	guard.handle_side_channel_output(id, "/home/user\n", 78, 1, 0);
	guard.handle_terminate(id, 78, 0, 0);
	assert_eq!(guard.uname(id), Some("Linux box 6.1"));
	assert_eq!(guard.home_directory(id), Some("/home/user"));
	assert!(guard.background_job_pids(id).is_empty());
}

#[test]
fn shell_report_injects_integration() {
	let (chain, _rx, id) = unframed_root(ConductorParams {
		should_inject_shell_integration: true,
		..params("host")
	});
	chain.lock().start(id);
	reply(&chain, id, &["/usr/bin/zsh\n/home/u\nzsh 5.9"], 0);
	let guard = chain.lock();
	assert_eq!(guard.modified_command_args(id), Some(&["/usr/bin/zsh".to_string()][..]));
	let vars = guard.modified_vars(id).unwrap();
	assert_eq!(vars["ZDOTDIR"], "/home/u/.iterm2/shell-integration/zsh");
	assert!(matches!(guard.current_command(id), Some(Command::SetEnv { key, .. }) if key == "ZDOTDIR"));
}

#[test]
fn failed_shell_report_stalls_quietly() {
	let (chain, mut rx, id) = unframed_root(params("host"));
	chain.lock().start(id);
	drain(&mut rx);
	reply(&chain, id, &["garbage"], 1);
	assert_eq!(chain.lock().state(id), StateKind::Ground);
	assert_eq!(chain.lock().shell(id), None);
	assert!(drain(&mut rx).is_empty());
}

#[test]
fn missing_python_falls_back_to_login_shell() {
	let (chain, mut rx, id) = unframed_root(params("host"));
	chain.lock().send(id, Command::PythonVersion, crate::context::Handler::CheckForPython(Vec::new()));
	drain(&mut rx);
	reply(&chain, id, &["sh: python3: not found"], 127);
	assert_eq!(current(&chain, id), Some(Command::ExecLoginShell(Vec::new())));
	assert!(drain(&mut rx).contains(&ConductorEvent::StopQueueingInput { node: id }));
	reply(&chain, id, &[], 0);
	assert!(drain(&mut rx).contains(&ConductorEvent::SendInitialText { node: id }));
}

#[test]
fn remote_command_args_run_instead_of_login_shell() {
	let (chain, _rx, id) = unframed_root(params("host ls -la"));
	chain.lock().exec_login_shell(id);
	assert_eq!(current(&chain, id), Some(Command::Run("ls -la".into())));
}

#[test]
fn old_python_with_pending_jump_evals_the_jump_script() {
	let (chain, _rx, id) = unframed_root(params("jump"));
	let mut guard = chain.lock();
	let hop = |sshargs: &str| ReconnectionInfo {
		sshargs: sshargs.into(),
		initial_directory: None,
		boolargs: String::new(),
	};
	guard.start_jumping(id, vec![hop("second"), hop("third")]);
	assert_eq!(guard.subsequent_jumps(id), &[hop("third")]);
	guard.python_checked(id, PythonVersion::new(3, 6));
	let queued = guard.queued_commands(id);
	let Some(Command::Eval(encoded)) = queued.last() else {
		panic!("expected an eval, got {queued:?}");
	};
	let script = String::from_utf8(base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).unwrap()).unwrap();
	assert!(script.starts_with("#!/usr/bin/env bash\nrm $SELF\n"));
	assert!(script.ends_with("it2ssh_wrapper second"));
}

#[test]
fn jumping_without_targets_does_nothing() {
	let (chain, mut rx, id) = unframed_root(params("jump"));
	chain.lock().start_jumping(id, Vec::new());
	assert!(drain(&mut rx).is_empty());
}

// ── C. Failure ──

#[test]
fn nonzero_setup_status_fails_and_clears_the_queue() {
	let (chain, mut rx, id) = unframed_root(bootstrap_params());
	chain.lock().start(id);
	reply(&chain, id, &["/bin/sh\n/root\n"], 0);
	drain(&mut rx);
	reply(&chain, id, &[], 1);
	let events = drain(&mut rx);
	assert_eq!(aborts(&events), vec!["setenv LANG C: Unexpected status 1".to_string()]);
	assert!(events.contains(&ConductorEvent::Write {
		node: id,
		text: "exec_login_shell\n".into()
	}));
	assert!(chain.lock().queued_commands(id).is_empty());
	assert_eq!(chain.lock().state(id), StateKind::Ground);
}

#[test]
fn unparsable_login_pid_fails() {
	let (chain, mut rx, id) = unframed_root(params("host"));
	chain.lock().finalize_framing(id, 0, "not-a-pid");
	assert_eq!(aborts(&drain(&mut rx)), vec!["Invalid process ID from remote: not-a-pid".to_string()]);
	assert!(!chain.lock().framing(id));
}

#[test]
fn failure_aborts_background_work_of_ancestors() {
	let (chain, _rx) = recording_chain(options());
	let root = framed_root(&chain, 1);
	let mut guard = chain.lock();
	let child = guard.add_conductor(params("inner"), Some(root)).unwrap();
	guard.eval(root, "busy");
	let mut pending = guard.framer_file(root, crate::command::FileSubcommand::Stat { path: b"/".to_vec() }, false);
	guard.fail(child, "boom");
	assert_eq!(pending.try_recv().unwrap(), (String::new(), -1));
	assert_eq!(guard.state(root), StateKind::Ground);
}

#[test]
fn quit_cancels_everything_and_sends_quit() {
	let registry = ConductorRegistry::new();
	let (chain, mut rx) = recording_chain(options().with_registry(Arc::clone(&registry)));
	let id = framed_root(&chain, 9);
	let mut guard = chain.lock();
	guard.eval(id, "busy");
	let mut queued = guard.framer_file(id, crate::command::FileSubcommand::Stat { path: b"/".to_vec() }, false);
	guard.quit(id);
	assert_eq!(queued.try_recv().unwrap(), (String::new(), -1));
	assert_eq!(guard.current_command(id), Some(&Command::Quit));
	assert!(registry.is_empty());
	let events = drain(&mut rx);
	assert!(events.contains(&ConductorEvent::Quit { node: id }));
	assert!(events.contains(&ConductorEvent::StateChanged { node: id }));
}

#[test]
fn unhook_aborts_and_stops_queueing() {
	let registry = ConductorRegistry::new();
	let (chain, _rx) = recording_chain(options().with_registry(Arc::clone(&registry)));
	let id = framed_root(&chain, 9);
	let (result, callback) = capture();
	let mut guard = chain.lock();
	guard.eval(id, "busy");
	guard.run_remote_command(id, "sleep 1", callback);
	guard.handle_unhook(id);
	assert_eq!(guard.state(id), StateKind::Unhooked);
	assert!(!guard.queue_writes(id));
	assert!(registry.is_empty());
	assert!(result.lock().is_none());
}

// ── D. Nesting and routing ──

fn nested() -> (SharedChain, Rx, NodeId, NodeId) {
	let (chain, rx) = recording_chain(options());
	let root = framed_root(&chain, 10);
	let child = {
		let mut guard = chain.lock();
		let child = guard
			.add_conductor(
				ConductorParams {
					dcs_id: "inner".into(),
					client_unique_id: "client-2".into(),
					..params("bob@inner")
				},
				Some(root),
			)
			.unwrap();
		guard.set_framed_pid(child, 20);
		child
	};
	(chain, rx, root, child)
}

#[test]
fn depth_follows_parent_framing() {
	let (chain, _rx, root, child) = nested();
	let mut guard = chain.lock();
	assert_eq!(guard.depth(root), 0);
	assert_eq!(guard.depth(child), 1);
	let unframed = guard.add_conductor(params("x"), None).unwrap();
	let grandchild = guard.add_conductor(params("y"), Some(unframed)).unwrap();
	assert_eq!(guard.depth(grandchild), 0);
}

#[test]
fn child_writes_travel_through_the_parent_framer() {
	let (chain, mut rx, root, child) = nested();
	chain.lock().eval(child, "x");
	let inner = Command::Eval(crate::command::b64(b"x")).serialize(128);
	let outer = Command::FramerSend {
		data: format!("{inner}\n").into_bytes(),
		pid: 10,
	};
	assert_eq!(current(&chain, root), Some(outer.clone()));
	assert_eq!(writes(&mut rx), vec![format!("{}\n", outer.serialize(128))]);
}

#[test]
fn events_are_routed_by_depth() {
	let (chain, _rx, root, child) = nested();
	let mut guard = chain.lock();
	guard.eval(child, "x");
	assert_eq!(guard.state(root), StateKind::WillExecute);
	assert_eq!(guard.state(child), StateKind::WillExecute);

	guard.handle_line(child, "for the child", 1);
	assert_eq!(guard.state(child), StateKind::Executing);
	assert_eq!(guard.state(root), StateKind::WillExecute);

	guard.handle_command_end(child, "send", "f", 0, 0);
	assert_eq!(guard.state(root), StateKind::Ground);
	assert_eq!(guard.state(child), StateKind::Executing);

	guard.handle_command_end(child, "eval", "f", 0, 1);
	assert_eq!(guard.state(child), StateKind::Ground);
}

#[test]
fn termination_of_the_framed_process_quits() {
	let (chain, _rx, root, child) = nested();
	let mut guard = chain.lock();
	guard.handle_terminate(child, 10, 0, 0);
	assert_eq!(guard.current_command(root), Some(&Command::Quit));
	assert_eq!(guard.state(child), StateKind::Ground);
}

#[test]
fn queue_writes_requires_every_ancestor() {
	let (chain, _rx, root, child) = nested();
	let mut guard = chain.lock();
	assert!(guard.queue_writes(child));
	assert!(guard.handles_keystrokes(child));
	guard.set_queue_writes_enabled(root, false);
	assert!(!guard.queue_writes(child));
	assert!(!guard.handles_keystrokes(child));
}

#[test]
fn ancestry_and_transfer_checks() {
	let (chain, _rx, root, child) = nested();
	let guard = chain.lock();
	assert!(guard.ancestry_contains(child, "client"));
	assert!(guard.ancestry_contains(child, "client-2"));
	assert!(!guard.ancestry_contains(root, "client-2"));
	assert!(guard.can_transfer_files_to(child, "inner", Some("bob")));
	assert!(!guard.can_transfer_files_to(child, "inner", Some("eve")));
}

#[test]
fn nesting_and_tree_are_outermost_first() {
	let (chain, _rx, root, child) = nested();
	let mut guard = chain.lock();
	assert_eq!(
		guard.nesting(child),
		vec![
			Nesting {
				pid: 10,
				dcs_id: "dcs".into()
			},
			Nesting {
				pid: 20,
				dcs_id: "inner".into()
			},
		]
	);
	assert_eq!(guard.tree(child), json!({"10": ["dcs", {"20": ["inner", {}]}]}));

	let loose = guard.add_conductor(params("z"), Some(root)).unwrap();
	assert_eq!(guard.tree(loose), json!({"10": ["dcs", {}]}));
	assert!(guard.nesting(loose).is_empty());
}

#[test]
fn unframed_keys_are_written_raw() {
	let (chain, mut rx, id) = unframed_root(params("host"));
	chain.lock().send_keys(id, &[b'A', 0xe9]);
	assert_eq!(writes(&mut rx), vec!["A\u{e9}".to_string()]);
}

// ── E. Side channel ──

#[test]
fn autopoll_output_accumulates_until_eof() {
	let (chain, mut rx) = recording_chain(options());
	let id = framed_root(&chain, 42);
	let mut guard = chain.lock();
	guard.handle_side_channel_output(id, "ps a\n", AUTOPOLL_PID, 1, 0);
	guard.handle_side_channel_output(id, "ps b\n", AUTOPOLL_PID, 1, 0);
	guard.handle_side_channel_output(id, "EOF", AUTOPOLL_PID, 1, 0);
	assert!(drain(&mut rx).contains(&ConductorEvent::Autopoll {
		node: id,
		output: "ps a\nps b\n".into()
	}));
	assert_eq!(guard.current_command(id), Some(&Command::FramerAutopoll));
}

#[test]
fn tty_notifications_track_password_prompts() {
	let (chain, _rx) = recording_chain(options());
	let id = framed_root(&chain, 42);
	let mut guard = chain.lock();
	assert!(!guard.at_password_prompt(id));
	guard.handle_side_channel_output(id, "%notif tty -echo +icanon", NOTIF_PID, 1, 0);
	assert!(guard.at_password_prompt(id));
	guard.handle_side_channel_output(id, "%notif tty +echo", NOTIF_PID, 1, 0);
	assert_eq!(guard.tty_state(id), TtyState { echo: true, icanon: true });
}

#[test]
fn background_job_reports_output_and_status() {
	let (chain, _rx) = recording_chain(options());
	let id = framed_root(&chain, 42);
	let (result, callback) = capture();
	chain.lock().run_remote_command(id, "ls", callback);
	reply(&chain, id, &["99"], 0);
	let mut guard = chain.lock();
	guard.handle_side_channel_output(id, "a\n", 99, 1, 0);
	guard.handle_side_channel_output(id, "b\n", 99, 1, 0);
	guard.handle_terminate(id, 99, 3, 0);
	assert_eq!(*result.lock(), Some((b"a\nb\n".to_vec(), 3)));
}

#[test]
fn stderr_from_a_background_job_abandons_it() {
	let (chain, _rx) = recording_chain(options());
	let id = framed_root(&chain, 42);
	let (result, callback) = capture();
	chain.lock().run_remote_command(id, "ls", callback);
	reply(&chain, id, &["99"], 0);
	chain.lock().handle_side_channel_output(id, "oops", 99, 2, 0);
	assert_eq!(*result.lock(), Some((Vec::new(), -2)));
}

#[test]
fn remote_command_on_pid_zero_fails_immediately() {
	let (chain, _rx) = recording_chain(options());
	let id = framed_root(&chain, 0);
	let (result, callback) = capture();
	chain.lock().run_remote_command(id, "ls", callback);
	assert_eq!(*result.lock(), Some((Vec::new(), -1)));
	assert_eq!(chain.lock().state(id), StateKind::Ground);
}

// ── F. Recovery ──

fn recover(chain: &SharedChain, id: NodeId, lines: &[&str]) -> Option<ConductorRecovery> {
	let mut guard = chain.lock();
	let mut recovered = None;
	for line in lines {
		recovered = guard.handle_recovery_line(id, &format!("{line}\r\n"));
	}
	recovered
}

#[test]
fn recovery_handshake_restores_the_framer() {
	let (chain, mut rx, root, _) = nested();
	let id = chain.lock().add_conductor(params("carol@deep"), Some(root)).unwrap();
	chain.lock().start_recovery(id);
	assert_eq!(chain.lock().state(id), StateKind::Recovery);
	let expected = format!("\n{}\n\n", crate::command::b64(b"recover"));
	assert_eq!(
		current(&chain, root),
		Some(Command::FramerSend {
			data: expected.into_bytes(),
			pid: 10
		})
	);
	drain(&mut rx);

	let recovery = recover(
		&chain,
		id,
		&[
			"not for us",
			":begin-recovery",
			":recovery: process 77 sleep",
			":recovery: login 555",
			":recovery: dcsID d3",
			":recovery: sshargs carol@deep",
			":recovery: boolArgs ",
			":recovery: clientUniqueID c3",
			":end-recovery",
		],
	)
	.unwrap();
	assert_eq!(recovery.pid, 555);
	assert_eq!(recovery.bool_args, "");
	assert_eq!(recovery.parent, Some(root));
	assert_eq!(recovery.tree, json!({"10": ["dcs", {"555": ["d3", {}]}]}));
	assert_eq!(chain.lock().framed_pid(id), Some(555));
	assert_eq!(chain.lock().state(id), StateKind::Ground);
}

#[test]
fn incomplete_recovery_quits() {
	let (chain, mut rx, id) = unframed_root(params("host"));
	chain.lock().start_recovery(id);
	let recovery = recover(&chain, id, &[":begin-recovery", ":recovery: login 5", ":end-recovery"]);
	assert_eq!(recovery, None);
	assert!(drain(&mut rx).contains(&ConductorEvent::Quit { node: id }));
}

#[test]
fn recovery_lines_before_begin_are_ignored() {
	let (chain, _rx, id) = unframed_root(params("host"));
	chain.lock().start_recovery(id);
	assert_eq!(recover(&chain, id, &[":recovery: login 5", ":end-recovery"]), None);
	assert_eq!(chain.lock().state(id), StateKind::Recovery);
}

#[test]
fn adopted_recovery_waits_for_finish() {
	let registry = ConductorRegistry::new();
	let (chain, _rx) = recording_chain(options().with_registry(Arc::clone(&registry)));
	let root = framed_root(&chain, 10);
	let mut guard = chain.lock();
	let id = guard
		.adopt_recovery(&ConductorRecovery {
			pid: 555,
			dcs_id: "d".into(),
			tree: json!({}),
			sshargs: "carol@deep".into(),
			bool_args: String::new(),
			client_unique_id: "c".into(),
			parent: Some(root),
		})
		.unwrap();
	assert_eq!(guard.state(id), StateKind::Recovered);
	assert_eq!(guard.depth(id), 1);
	assert_eq!(guard.current_operation_description(id), "recovered");
	guard.recovery_did_finish(id);
	assert_eq!(guard.state(id), StateKind::Ground);
	assert_eq!(registry.lookup(guard.identity(id)).len(), 1);
}

// ── G. Misc ──

#[test]
fn payload_destinations_are_normalized() {
	let (chain, _rx, id) = unframed_root(params("host"));
	let mut guard = chain.lock();
	guard.add_payload(id, "/tmp/a", "~/bin/");
	guard.add_payload(id, "/tmp/b", "/opt/x//");
	let destinations: Vec<&str> = guard.payloads(id).iter().map(|p| p.destination.as_str()).collect();
	assert_eq!(destinations, vec!["/$HOME/bin", "/opt/x"]);
}

#[test]
fn reconnection_info_prefers_current_directory() {
	let (chain, _rx, id) = unframed_root(ConductorParams {
		bool_args: "AX".into(),
		initial_directory: Some("/start".into()),
		..params("host")
	});
	let mut guard = chain.lock();
	assert_eq!(guard.reconnection_info(id).initial_directory.as_deref(), Some("/start"));
	guard.set_current_directory(id, Some("/now".into()));
	let info = guard.reconnection_info(id);
	assert_eq!(info.initial_directory.as_deref(), Some("/now"));
	assert_eq!(info.boolargs, "AX");
}

#[test]
fn resynchronize_resets_transitively() {
	let (chain, _rx, root, child) = nested();
	let mut guard = chain.lock();
	guard.eval(root, "busy");
	guard.eval(root, "queued");
	guard.did_resynchronize(child);
	assert_eq!(guard.current_command(root), Some(&Command::FramerReset));
	assert_eq!(guard.queued_commands(root)[0], Command::FramerAutopoll);
}

#[test]
fn operation_description_reflects_state() {
	let (chain, _rx) = recording_chain(options());
	let id = framed_root(&chain, 42);
	let mut guard = chain.lock();
	assert_eq!(guard.current_operation_description(id), "waiting");
	guard.register_process(id, 7);
	assert_eq!(guard.current_operation_description(id), "register 7 (preparation stage)");
}
