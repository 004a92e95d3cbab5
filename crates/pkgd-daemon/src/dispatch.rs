use tracing::warn;

use pkgd_core::PackageOps;

pub const FAILURE: i32 = -1;

type Handler = fn(&dyn PackageOps, &[&str], &mut String) -> i32;

pub struct CommandSpec {
    pub name: &'static str,
    pub arity: usize,
    handler: Handler,
}

// The table is the protocol surface: adding a command is one line here.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec { name: "ping", arity: 0, handler: do_ping },
    CommandSpec { name: "install", arity: 4, handler: do_install },
    CommandSpec { name: "dexopt", arity: 6, handler: do_dexopt },
    CommandSpec { name: "markbootcomplete", arity: 1, handler: do_mark_boot_complete },
    CommandSpec { name: "movedex", arity: 3, handler: do_move_dex },
    CommandSpec { name: "rmdex", arity: 2, handler: do_rm_dex },
    CommandSpec { name: "remove", arity: 2, handler: do_remove },
    CommandSpec { name: "rename", arity: 2, handler: do_rename },
    CommandSpec { name: "fixuid", arity: 3, handler: do_fixuid },
    CommandSpec { name: "freecache", arity: 1, handler: do_free_cache },
    CommandSpec { name: "rmcache", arity: 2, handler: do_rm_cache },
    CommandSpec { name: "rmcodecache", arity: 2, handler: do_rm_code_cache },
    CommandSpec { name: "getsize", arity: 7, handler: do_get_size },
    CommandSpec { name: "rmuserdata", arity: 2, handler: do_rm_user_data },
    CommandSpec { name: "movefiles", arity: 0, handler: do_movefiles },
    CommandSpec { name: "linklib", arity: 3, handler: do_linklib },
    CommandSpec { name: "mkuserdata", arity: 4, handler: do_mk_user_data },
    CommandSpec { name: "mkuserconfig", arity: 1, handler: do_mk_user_config },
    CommandSpec { name: "rmuser", arity: 1, handler: do_rm_user },
    CommandSpec { name: "idmap", arity: 3, handler: do_idmap },
    CommandSpec { name: "restorecondata", arity: 3, handler: do_restorecon_data },
    CommandSpec { name: "patchoat", arity: 5, handler: do_patchoat },
];

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name == name)
}

pub fn dispatch(ops: &dyn PackageOps, tokens: &[&str]) -> (i32, String) {
    let mut reply = String::new();
    let Some((&name, args)) = tokens.split_first() else {
        warn!("empty command line");
        return (FAILURE, reply);
    };
    let Some(spec) = lookup(name) else {
        warn!(command = name, "unsupported command");
        return (FAILURE, reply);
    };
    if args.len() != spec.arity {
        warn!(
            command = name,
            required = spec.arity,
            given = args.len(),
            "argument count mismatch"
        );
        return (FAILURE, reply);
    }
    let code = (spec.handler)(ops, args, &mut reply);
    (code, reply)
}

// Numeric arguments parse leniently to zero; the socket peer credential is
// the trust boundary, not argument validation.
fn parse_id(arg: &str) -> u32 {
    arg.parse().unwrap_or(0)
}

fn parse_flag(arg: &str) -> bool {
    parse_id(arg) != 0
}

fn parse_bytes(arg: &str) -> i64 {
    arg.parse().unwrap_or(0)
}

fn do_ping(_ops: &dyn PackageOps, _args: &[&str], _reply: &mut String) -> i32 {
    0
}

fn do_install(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.install(args[0], parse_id(args[1]), parse_id(args[2]), args[3])
}

fn do_dexopt(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.dexopt(
        args[0],
        parse_id(args[1]),
        parse_flag(args[2]),
        args[3],
        args[4],
        parse_flag(args[5]),
        false,
    )
}

fn do_patchoat(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.dexopt(
        args[0],
        parse_id(args[1]),
        parse_flag(args[2]),
        args[3],
        args[4],
        false,
        true,
    )
}

fn do_mark_boot_complete(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.mark_boot_complete(args[0])
}

fn do_move_dex(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.move_dex(args[0], args[1], args[2])
}

fn do_rm_dex(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.rm_dex(args[0], args[1])
}

fn do_remove(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.uninstall(args[0], parse_id(args[1]))
}

fn do_rename(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.rename_package(args[0], args[1])
}

fn do_fixuid(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.fix_uid(args[0], parse_id(args[1]), parse_id(args[2]))
}

fn do_free_cache(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.free_cache(parse_bytes(args[0]))
}

fn do_rm_cache(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.delete_cache(args[0], parse_id(args[1]))
}

fn do_rm_code_cache(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.delete_code_cache(args[0], parse_id(args[1]))
}

fn do_get_size(ops: &dyn PackageOps, args: &[&str], reply: &mut String) -> i32 {
    let (code, stats) = ops.get_size(
        args[0],
        parse_id(args[1]),
        args[2],
        args[3],
        args[4],
        args[5],
        args[6],
    );
    *reply = format!(
        "{} {} {} {}",
        stats.code_size, stats.data_size, stats.cache_size, stats.asec_size
    );
    code
}

fn do_rm_user_data(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.delete_user_data(args[0], parse_id(args[1]))
}

fn do_movefiles(ops: &dyn PackageOps, _args: &[&str], _reply: &mut String) -> i32 {
    ops.move_files()
}

fn do_linklib(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.link_lib(args[0], args[1], parse_id(args[2]))
}

fn do_mk_user_data(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.make_user_data(args[0], parse_id(args[1]), parse_id(args[2]), args[3])
}

fn do_mk_user_config(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.make_user_config(parse_id(args[0]))
}

fn do_rm_user(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.delete_user(parse_id(args[0]))
}

fn do_idmap(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.idmap(args[0], args[1], parse_id(args[2]))
}

fn do_restorecon_data(ops: &dyn PackageOps, args: &[&str], _reply: &mut String) -> i32 {
    ops.restorecon_data(args[0], args[1], parse_id(args[2]))
}
