use nostr_directory::{
    parse_relay_hints, Directory, Error, ErrorKind, Event, IdentityRecord, IdentityStore,
    Profile, PublicKey, RelayUrl, Settings, SqliteStore, SyncResult,
};
use std::env;
use std::sync::Arc;
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct Command {
    cmd: &'static str,
    usage_params: &'static str,
    desc: &'static str,
}

impl Command {
    fn usage(&self, msg: String) -> Result<(), Error> {
        Err(ErrorKind::Usage(
            msg,
            format!("nostr-directory {} {}", self.cmd, self.usage_params),
        )
        .into())
    }
}

const COMMANDS: [Command; 13] = [
    Command {
        cmd: "help",
        usage_params: "<command>",
        desc: "show this list",
    },
    Command {
        cmd: "hex",
        usage_params: "<npub>",
        desc: "print the hex form of a public key",
    },
    Command {
        cmd: "members",
        usage_params: "[<search>]",
        desc: "list registered identities, newest first, optionally matching username or public key",
    },
    Command {
        cmd: "npub",
        usage_params: "<pubkeyhex>",
        desc: "print the npub form of a public key",
    },
    Command {
        cmd: "print_identity",
        usage_params: "<username | pubkey>",
        desc: "print the identity record (in JSON) with its cached metadata",
    },
    Command {
        cmd: "print_settings",
        usage_params: "",
        desc: "print all settings",
    },
    Command {
        cmd: "register",
        usage_params: "<username> <pubkey> [<lightning_address | ->] [<relayurl>,...]",
        desc: "register a username for a public key",
    },
    Command {
        cmd: "set_setting",
        usage_params: "<key> <value>",
        desc: "change a setting. bootstrap_relays takes a comma separated list.",
    },
    Command {
        cmd: "sync",
        usage_params: "<username | pubkey>",
        desc: "refresh the identity's metadata from relays if it has expired, and print it",
    },
    Command {
        cmd: "sync_all",
        usage_params: "",
        desc: "refresh the metadata of every registered identity that has expired",
    },
    Command {
        cmd: "update_account",
        usage_params: "<pubkey> <username> [<lightning_address | ->] [<relayurl>,...]",
        desc: "change the username, lightning address and relays of an identity",
    },
    Command {
        cmd: "verify_login",
        usage_params: "<event_json> <pubkey>",
        desc: "check that the signed event proves ownership of the public key",
    },
    Command {
        cmd: "well_known",
        usage_params: "[<name>]",
        desc: "print the /.well-known/nostr.json document for a name (default _)",
    },
];

pub fn handle_command(mut args: env::Args, rt: &Runtime) -> Result<(), Error> {
    let command_string = match args.next() {
        Some(c) => c,
        None => return help_all(),
    };

    let command = match COMMANDS.iter().find(|c| c.cmd == command_string) {
        Some(c) => c.to_owned(),
        None => return Err(ErrorKind::UnknownCommand(command_string).into()),
    };

    match command.cmd {
        "help" => help(command, args)?,
        "hex" => hex(command, args)?,
        "members" => members(command, args, rt)?,
        "npub" => npub(command, args)?,
        "print_identity" => print_identity(command, args, rt)?,
        "print_settings" => print_settings(rt)?,
        "register" => register(command, args, rt)?,
        "set_setting" => set_setting(command, args, rt)?,
        "sync" => sync(command, args, rt)?,
        "sync_all" => sync_all(rt)?,
        "update_account" => update_account(command, args, rt)?,
        "verify_login" => verify_login(command, args)?,
        "well_known" => well_known(args, rt)?,
        other => println!("Unknown command {}", other),
    }

    Ok(())
}

pub fn help_all() -> Result<(), Error> {
    println!("Usage: nostr-directory <command> [<params>]\n");
    for c in COMMANDS.iter() {
        println!("  {} {}", c.cmd, c.usage_params);
    }
    Ok(())
}

pub fn help(_cmd: Command, mut args: env::Args) -> Result<(), Error> {
    if let Some(sub) = args.next() {
        for c in COMMANDS.iter() {
            if sub == c.cmd {
                println!("nostr-directory {} {}", c.cmd, c.usage_params);
                println!("    {}", c.desc);
                return Ok(());
            }
        }
        println!("No such command {}", sub);
        Ok(())
    } else {
        help_all()
    }
}

// The store and settings every database command starts from
fn open(rt: &Runtime) -> Result<(Arc<SqliteStore>, Settings), Error> {
    rt.block_on(async {
        let store = SqliteStore::open(Profile::current()?.database_path).await?;
        let settings = Settings::load(&store).await?;
        Ok::<_, Error>((Arc::new(store), settings))
    })
}

fn directory(rt: &Runtime) -> Result<(Arc<SqliteStore>, Directory), Error> {
    let (store, settings) = open(rt)?;
    let directory = Directory::with_relays(store.clone(), &settings);
    Ok((store, directory))
}

// An optional lightning address, where "-" means none
fn lightning_address(arg: Option<String>) -> Option<String> {
    arg.filter(|a| a != "-")
}

fn relays(arg: Option<String>) -> Vec<RelayUrl> {
    match arg {
        Some(list) => parse_relay_hints(list.split(',')),
        None => vec![],
    }
}

async fn find_identity(
    store: &SqliteStore,
    username_or_key: &str,
) -> Result<Option<IdentityRecord>, Error> {
    match PublicKey::normalize(username_or_key) {
        Ok(pubkey) => store.read_by_pubkey(pubkey).await,
        Err(_) => store.read_by_username(username_or_key).await,
    }
}

fn print_sync_result(record: &IdentityRecord, result: &SyncResult) -> Result<(), Error> {
    let state = match result {
        SyncResult::Cached(_) => "cached",
        SyncResult::Refreshed(_) => "refreshed",
        SyncResult::Unavailable(_) => "unavailable",
    };
    println!("{} ({}): {}", record.username, record.pubkey.as_bech32_string(), state);
    println!("{}", serde_json::to_string_pretty(result.metadata())?);
    Ok(())
}

pub fn hex(cmd: Command, mut args: env::Args) -> Result<(), Error> {
    let key = match args.next() {
        Some(key) => key,
        None => return cmd.usage("Missing npub parameter".to_string()),
    };
    println!("{}", PublicKey::normalize(&key)?.as_hex_string());
    Ok(())
}

pub fn npub(cmd: Command, mut args: env::Args) -> Result<(), Error> {
    let key = match args.next() {
        Some(key) => key,
        None => return cmd.usage("Missing pubkeyhex parameter".to_string()),
    };
    println!("{}", PublicKey::normalize(&key)?.as_bech32_string());
    Ok(())
}

pub fn members(_cmd: Command, mut args: env::Args, rt: &Runtime) -> Result<(), Error> {
    let search = args.next();
    let (_store, directory) = directory(rt)?;
    let members = rt.block_on(directory.members(search.as_deref()))?;
    for member in members.iter() {
        println!(
            "{} {} {}",
            member.pubkey,
            member.username,
            member.metadata.display_name.as_deref().unwrap_or("")
        );
    }
    println!("{} of {} members", members.len(), rt.block_on(directory.member_count())?);
    Ok(())
}

pub fn print_identity(cmd: Command, mut args: env::Args, rt: &Runtime) -> Result<(), Error> {
    let who = match args.next() {
        Some(who) => who,
        None => return cmd.usage("Missing username or pubkey parameter".to_string()),
    };
    let (store, _settings) = open(rt)?;
    match rt.block_on(find_identity(&store, &who))? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => return Err(ErrorKind::IdentityNotFound(who).into()),
    }
    Ok(())
}

pub fn print_settings(rt: &Runtime) -> Result<(), Error> {
    let (_store, settings) = open(rt)?;
    for (key, value) in settings.to_pairs()? {
        println!("{} = {}", key, value);
    }
    Ok(())
}

pub fn register(cmd: Command, mut args: env::Args, rt: &Runtime) -> Result<(), Error> {
    let username = match args.next() {
        Some(username) => username,
        None => return cmd.usage("Missing username parameter".to_string()),
    };
    let pubkey = match args.next() {
        Some(key) => PublicKey::normalize(&key)?,
        None => return cmd.usage("Missing pubkey parameter".to_string()),
    };
    let lightning_address = lightning_address(args.next());
    let relays = relays(args.next());

    let (store, _settings) = open(rt)?;
    let record = rt.block_on(store.register(&username, pubkey, lightning_address, relays))?;
    println!("Registered {} as {}", record.username, record.pubkey.as_bech32_string());
    Ok(())
}

pub fn set_setting(cmd: Command, mut args: env::Args, rt: &Runtime) -> Result<(), Error> {
    let key = match args.next() {
        Some(key) => key,
        None => return cmd.usage("Missing key parameter".to_string()),
    };
    let value = match args.next() {
        Some(value) => value,
        None => return cmd.usage("Missing value parameter".to_string()),
    };

    let (store, mut settings) = open(rt)?;
    settings.apply(&key, &value)?;
    rt.block_on(settings.save(&store))?;
    println!("{} updated", key);
    Ok(())
}

pub fn sync(cmd: Command, mut args: env::Args, rt: &Runtime) -> Result<(), Error> {
    let who = match args.next() {
        Some(who) => who,
        None => return cmd.usage("Missing username or pubkey parameter".to_string()),
    };
    let (store, directory) = directory(rt)?;
    let record = match rt.block_on(find_identity(&store, &who))? {
        Some(record) => record,
        None => return Err(ErrorKind::IdentityNotFound(who).into()),
    };
    match rt.block_on(directory.sync_username(&record.username))? {
        Some((record, result)) => print_sync_result(&record, &result)?,
        None => return Err(ErrorKind::IdentityNotFound(who).into()),
    }
    Ok(())
}

pub fn sync_all(rt: &Runtime) -> Result<(), Error> {
    let (_store, directory) = directory(rt)?;
    let results = rt.block_on(directory.sync_all())?;
    let available = results.iter().filter(|(_, r)| r.is_available()).count();
    for (record, result) in results.iter() {
        print_sync_result(record, result)?;
    }
    println!("{} of {} identities have metadata", available, results.len());
    Ok(())
}

pub fn update_account(cmd: Command, mut args: env::Args, rt: &Runtime) -> Result<(), Error> {
    let pubkey = match args.next() {
        Some(key) => PublicKey::normalize(&key)?,
        None => return cmd.usage("Missing pubkey parameter".to_string()),
    };
    let username = match args.next() {
        Some(username) => username,
        None => return cmd.usage("Missing username parameter".to_string()),
    };
    let lightning_address = lightning_address(args.next());
    let relays = relays(args.next());

    let (store, _settings) = open(rt)?;
    rt.block_on(store.update_account(pubkey, &username, lightning_address, relays))?;
    println!("Account updated");
    Ok(())
}

pub fn verify_login(cmd: Command, mut args: env::Args) -> Result<(), Error> {
    let json = match args.next() {
        Some(json) => json,
        None => return cmd.usage("Missing event_json parameter".to_string()),
    };
    let claimed = match args.next() {
        Some(key) => Directory::normalize_key(&key)?,
        None => return cmd.usage("Missing pubkey parameter".to_string()),
    };

    let event: Event = serde_json::from_str(&json)?;
    if Directory::verify_login(&event, &claimed) {
        println!("Valid login for {}", claimed.as_bech32_string());
    } else {
        println!("Login refused");
    }
    Ok(())
}

pub fn well_known(mut args: env::Args, rt: &Runtime) -> Result<(), Error> {
    let name = args.next().unwrap_or_else(|| "_".to_owned());
    let (_store, directory) = directory(rt)?;
    match rt.block_on(directory.well_known(&name))? {
        Some(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
        None => return Err(ErrorKind::IdentityNotFound(name).into()),
    }
    Ok(())
}
