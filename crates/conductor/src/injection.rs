//! Rewrites a remote shell's environment and arguments so it sources the
//! uploaded shell-integration scripts.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::payload::Payload;

/// Remote directory, relative to the home directory, that receives the scripts.
pub const REMOTE_INTEGRATION_DIR: &str = ".iterm2/shell-integration";

/// Scripts uploaded alongside a shell, relative to the integration directory.
pub const INTEGRATION_FILES: &[&str] = &[
	".iterm2_shell_integration.bash",
	"zsh/.zshenv",
	"zsh/.iterm2_shell_integration.zsh",
	"fish/vendor_conf.d/iterm2_shell_integration.fish",
];

pub type Environment = BTreeMap<String, String>;

pub trait ShellIntegrationInjector: Send + Sync {
	/// Returns the environment and arguments to launch `shell` with.
	///
	/// `argv` holds the shell's arguments without the shell itself.
	fn modify_remote_environment(&self, integration_dir: &str, env: &Environment, shell: &str, argv: &[String]) -> (Environment, Vec<String>);

	/// Local scripts paired with their destination under `destination_base`.
	fn files(&self, destination_base: &str) -> Vec<Payload>;
}

/// Shells with an injection recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectableShell {
	Bash,
	Zsh,
	Fish,
}

impl InjectableShell {
	/// Recognizes a shell by the last component of its path. A leading `-` (login shell) is ignored.
	pub fn from_path(path: &str) -> Option<Self> {
		let name = path.rsplit('/').next().unwrap_or(path).to_lowercase();
		match name.strip_prefix('-').unwrap_or(&name) {
			"bash" => Some(Self::Bash),
			"zsh" => Some(Self::Zsh),
			"fish" => Some(Self::Fish),
			_ => None,
		}
	}
}

/// Whether injection is known to work for `shell_name` reporting `version`.
///
/// The bash shipped with macOS (3.2.57) cannot load the scripts.
pub fn shell_supports_injection(shell_name: &str, version: &str) -> bool {
	match shell_name {
		"zsh" | "fish" => true,
		"bash" => !(version.contains("GNU bash, version 3.2.57") && version.contains("apple-darwin")),
		_ => false,
	}
}

#[derive(Debug, Clone, Default)]
pub struct DefaultInjector {
	local_dir: Option<PathBuf>,
}

impl DefaultInjector {
	/// `local_dir` holds the scripts to upload; without it no files are sent.
	pub fn new(local_dir: Option<PathBuf>) -> Self {
		Self { local_dir }
	}

	pub fn local_dir(&self) -> Option<&Path> {
		self.local_dir.as_deref()
	}
}

impl ShellIntegrationInjector for DefaultInjector {
	fn modify_remote_environment(&self, integration_dir: &str, env: &Environment, shell: &str, argv: &[String]) -> (Environment, Vec<String>) {
		let mut env = env.clone();
		let mut argv = argv.to_vec();
		match InjectableShell::from_path(shell) {
			Some(InjectableShell::Zsh) => inject_zsh(integration_dir, &mut env),
			Some(InjectableShell::Fish) => inject_fish(integration_dir, &mut env),
			Some(InjectableShell::Bash) => inject_bash(integration_dir, &mut env, &mut argv),
			None => {}
		}
		(env, argv)
	}

	fn files(&self, destination_base: &str) -> Vec<Payload> {
		let Some(local) = &self.local_dir else {
			return Vec::new();
		};
		INTEGRATION_FILES
			.iter()
			.map(|name| Payload {
				path: local.join(name).to_string_lossy().into_owned(),
				destination: format!("{destination_base}/{name}"),
			})
			.collect()
	}
}

fn inject_zsh(dir: &str, env: &mut Environment) {
	match env.get("ZDOTDIR").cloned() {
		Some(original) => {
			env.insert("IT2_ORIG_ZDOTDIR".into(), original);
		}
		None => {
			env.remove("IT2_ORIG_ZDOTDIR");
		}
	}
	env.insert("ZDOTDIR".into(), format!("{dir}/zsh"));
}

fn inject_fish(dir: &str, env: &mut Environment) {
	env.insert("IT2_FISH_XDG_DATA_DIRS".into(), dir.to_string());
	let dirs = match env.get("XDG_DATA_DIRS") {
		Some(existing) => format!("{dir}:{existing}"),
		None => dir.to_string(),
	};
	env.insert("XDG_DATA_DIRS".into(), dirs);
}

fn inject_bash(dir: &str, env: &mut Environment, argv: &mut Vec<String>) {
	let mut inject = BTreeSet::from(["1"]);
	let mut posix_env = String::new();
	let mut rc_file = String::new();
	let mut remove = BTreeSet::new();
	let mut expecting_multi_char = true;
	let mut expecting_option_arg = false;
	let mut expecting_file_arg = false;
	let mut interactive = false;
	let mut file_arg = false;

	for (i, arg) in argv.iter().enumerate() {
		if expecting_file_arg {
			file_arg = true;
			break;
		}
		if expecting_option_arg {
			expecting_option_arg = false;
			continue;
		}
		if arg == "-" || arg == "--" {
			expecting_file_arg = true;
			continue;
		}
		let single = (arg.starts_with('-') || arg.starts_with("+O")) && !arg[1..].starts_with('-');
		if single {
			expecting_multi_char = false;
			let mut options = arg.trim_start_matches(['-', '+']);
			if let Some((lhs, rhs)) = options.split_once('O') {
				// shopt name follows as the next argument
				expecting_option_arg = rhs.is_empty();
				options = lhs;
			}
			if options.contains('c') {
				return;
			}
			if options.contains('s') {
				break;
			}
			if options.contains('i') {
				interactive = true;
			}
		} else if arg.starts_with("--") && expecting_multi_char {
			match arg.as_str() {
				"--posix" => {
					inject.insert("posix");
					posix_env = env.get("ENV").cloned().unwrap_or_default();
				}
				"--norc" => {
					inject.insert("no-rc");
					remove.insert(i);
				}
				"--noprofile" => {
					inject.insert("no-profile");
					remove.insert(i);
				}
				"--rcfile" | "--init-file" if i + 1 < argv.len() => {
					expecting_option_arg = true;
					rc_file = argv[i + 1].clone();
					remove.insert(i);
					remove.insert(i + 1);
				}
				_ => {}
			}
		} else {
			file_arg = true;
			break;
		}
	}
	if file_arg && !interactive {
		return;
	}

	env.insert("ENV".into(), format!("{dir}/.iterm2_shell_integration.bash"));
	env.insert("IT2_BASH_INJECT".into(), inject.iter().copied().collect::<Vec<_>>().join(" "));
	if !posix_env.is_empty() {
		env.insert("IT2_BASH_POSIX_ENV".into(), posix_env);
	}
	if !rc_file.is_empty() {
		env.insert("IT2_BASH_RCFILE".into(), rc_file);
	}
	let mut index = 0;
	argv.retain(|_| {
		let keep = !remove.contains(&index);
		index += 1;
		keep
	});
	if !env.contains_key("HISTFILE") && !inject.contains("posix") {
		env.insert("HISTFILE".into(), "~/.bash_history".into());
		env.insert("IT2_BASH_UNEXPORT_HISTFILE".into(), "1".into());
	}
	argv.insert(0, "--posix".into());
}
