use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SshArgsError;

/// `ssh` options that consume the following argument.
const OPTIONS_WITH_VALUE: &str = "BbcDEeFIiJLlmOoPpQRSWw";

/// Who is connected where.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SshIdentity {
	pub user: Option<String>,
	pub host: String,
	pub port: Option<u16>,
}

impl SshIdentity {
	pub fn new(host: impl Into<String>, user: Option<String>, port: Option<u16>) -> Self {
		Self { user, host: host.into(), port }
	}

	/// True when `host` matches and `user`, if given, matches too.
	pub fn matches(&self, host: &str, user: Option<&str>) -> bool {
		self.host == host && user.is_none_or(|u| self.user.as_deref() == Some(u))
	}
}

impl fmt::Display for SshIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if let Some(user) = &self.user {
			write!(f, "{user}@")?;
		}
		f.write_str(&self.host)?;
		if let Some(port) = self.port {
			write!(f, ":{port}")?;
		}
		Ok(())
	}
}

/// The parts of an `ssh` command line the conductor cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSshArguments {
	pub identity: SshIdentity,
	/// Remote command and its arguments, after the destination.
	pub command_args: Vec<String>,
}

impl ParsedSshArguments {
	/// Parses arguments as passed to `ssh`, without the program name.
	///
	/// `boolean_args` lists option letters that never take a value, overriding
	/// the built-in table.
	pub fn parse(sshargs: &str, boolean_args: &str) -> Result<Self, SshArgsError> {
		let tokens = shlex::split(sshargs).ok_or(SshArgsError::Unbalanced)?;
		let mut tokens = tokens.into_iter();
		let mut user = None;
		let mut port = None;

		let destination = loop {
			let Some(token) = tokens.next() else {
				return Err(SshArgsError::MissingDestination);
			};
			if token == "--" {
				break tokens.next().ok_or(SshArgsError::MissingDestination)?;
			}
			let Some(flags) = token.strip_prefix('-').filter(|f| !f.is_empty()) else {
				break token;
			};
			for (i, flag) in flags.char_indices() {
				if boolean_args.contains(flag) || !OPTIONS_WITH_VALUE.contains(flag) {
					continue;
				}
				let rest = &flags[i + flag.len_utf8()..];
				let value = if rest.is_empty() { tokens.next().ok_or(SshArgsError::MissingValue(flag))? } else { rest.to_string() };
				match flag {
					'l' => user = Some(value),
					'p' => port = Some(value.parse().map_err(|_| SshArgsError::InvalidPort(value))?),
					_ => {}
				}
				break;
			}
		};

		let (dest_user, host) = match destination.rsplit_once('@') {
			Some((u, h)) => (Some(u.to_string()), h.to_string()),
			None => (None, destination),
		};
		Ok(Self {
			identity: SshIdentity::new(host, dest_user.or(user), port),
			command_args: tokens.collect(),
		})
	}
}
