use assert_cmd::Command;
use insta_cmd::get_cargo_bin;

pub fn datamd_cmd() -> Command {
	let mut cmd = Command::new(get_cargo_bin("datamd"));
	cmd.env("NO_COLOR", "1")
		.env_remove("DATAMD_CONFIG_FILE")
		.env_remove("DATAMD_LOG");
	cmd
}
