use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use guild_core::{
    build_headless_app_with, load_raid_config_from_env, Authority, AuthorityHandle, ServerConfig,
    SnapshotStore,
};
use guild_runtime::{parse_command_line, CommandReply};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();
    let raid_config = load_raid_config_from_env();
    let store = SnapshotStore::new(config.data_dir.clone());

    let build_config = config.clone();
    let build_store = store.clone();
    let (handle, authority) = Authority::spawn(
        move || build_headless_app_with(build_config, raid_config, build_store.load_all()),
        store,
        config.clone(),
    );

    match handle.subscribe() {
        Ok(announcements) => {
            thread::spawn(move || {
                for line in announcements {
                    info!(target: "guilds::server", %line, "broadcast");
                }
            });
        }
        Err(err) => warn!(target: "guilds::server", error = %err, "broadcast.subscribe_failed"),
    }

    if let Err(err) = spawn_command_listener(config.command_bind, handle) {
        warn!(
            target: "guilds::server",
            bind = %config.command_bind,
            error = %err,
            "listener.bind_failed"
        );
        return;
    }

    info!(
        target: "guilds::server",
        command_bind = %config.command_bind,
        data_dir = %config.data_dir.display(),
        "Guilds headless server ready"
    );

    match authority.join() {
        Ok(Ok(())) => info!(target: "guilds::server", "server.stopped"),
        Ok(Err(err)) => warn!(target: "guilds::server", error = %err, "server.stopped=save_failed"),
        Err(_) => warn!(target: "guilds::server", "server.stopped=authority_panicked"),
    }
}

fn spawn_command_listener(bind_addr: SocketAddr, handle: AuthorityHandle) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr)?;
    listener.set_nonblocking(true)?;

    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!(target: "guilds::server", %addr, "client.connected");
                let handle = handle.clone();
                thread::spawn(move || handle_client(stream, addr, handle));
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                warn!(target: "guilds::server", error = %err, "client.accept_failed");
                thread::sleep(Duration::from_millis(200));
            }
        }
    });

    Ok(())
}

fn handle_client(stream: TcpStream, addr: SocketAddr, handle: AuthorityHandle) {
    if let Err(err) = stream.set_nonblocking(false) {
        warn!(target: "guilds::server", %addr, error = %err, "client.blocking_mode_failed");
        return;
    }
    let writer = match stream.try_clone() {
        Ok(stream) => stream,
        Err(err) => {
            warn!(target: "guilds::server", %addr, error = %err, "client.clone_failed");
            return;
        }
    };
    let mut writer = BufWriter::new(writer);
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let reply = match parse_command_line(trimmed) {
                    Ok(envelope) => match handle.request(envelope) {
                        Ok(reply) => reply,
                        Err(err) => {
                            let _ = write_reply(&mut writer, &CommandReply::rejected(err.to_string()));
                            break;
                        }
                    },
                    Err(err) => {
                        warn!(target: "guilds::server", %addr, input = trimmed, error = %err, "command.invalid");
                        CommandReply::rejected(err.to_string())
                    }
                };
                if let Err(err) = write_reply(&mut writer, &reply) {
                    warn!(target: "guilds::server", %addr, error = %err, "client.write_failed");
                    break;
                }
            }
            Err(err) => {
                warn!(target: "guilds::server", %addr, error = %err, "client.read_failed");
                break;
            }
        }
    }
    info!(target: "guilds::server", %addr, "client.disconnected");
}

fn write_reply(writer: &mut impl Write, reply: &CommandReply) -> std::io::Result<()> {
    for line in reply.to_lines() {
        writeln!(writer, "{line}")?;
    }
    // Blank line terminates a reply.
    writeln!(writer)?;
    writer.flush()
}
