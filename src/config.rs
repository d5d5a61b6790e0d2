use clap::Parser;

/// Bridges a Wayland compositor output to an RFB/VNC server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CmdArgs {
    /// Select compositor output by name. Required if the compositor
    /// advertises more than one output.
    #[arg(short, long)]
    pub output: Option<String>,

    /// RFB listen address.
    #[arg(short, long, default_value = "127.0.0.1")]
    pub bind: std::net::Ipv4Addr,

    /// RFB listen port.
    #[arg(short, long, default_value_t = 5100)]
    pub port: u16,

    /// Capture period in milliseconds.
    #[arg(short = 't', long, default_value_t = 30)]
    pub period: u64,

    /// Disable the synthetic uinput pointer device.
    #[arg(short = 'U', long, default_value_t = false)]
    pub no_uinput: bool,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
