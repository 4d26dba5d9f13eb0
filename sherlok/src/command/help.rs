//! Help tree for the shell

use crate::output::Tag;

struct HelpEntry {
    verb: &'static str,
    usage: &'static str,
    description: &'static str,
}

const HELP: &[HelpEntry] = &[
    HelpEntry { verb: "help", usage: "help [command]", description: "show this help" },
    HelpEntry { verb: "man", usage: "man [command]", description: "show this help" },
    HelpEntry {
        verb: "start",
        usage: "start monitor|trace|log|jarm",
        description: "enable the named subsystem",
    },
    HelpEntry {
        verb: "stop",
        usage: "stop monitor|trace|log|jarm",
        description: "disable the named subsystem",
    },
    HelpEntry {
        verb: "lsc",
        usage: "lsc -f<name> -m<bytes> -c<count> -s<n|s|c|h|H|a|f> -x -h -d -C<hex-id>",
        description: "list classes with memory figures",
    },
    HelpEntry {
        verb: "lml",
        usage: "lml -f<name> -s<col> -h -x",
        description: "list classes whose growth alert fired",
    },
    HelpEntry {
        verb: "lsm",
        usage: "lsm -f<name> -m<calls> -u<cpu-us> -s<n|C|c|e|o> -g -x -C<hex-id>",
        description: "list methods with call counters",
    },
    HelpEntry {
        verb: "lhd",
        usage: "lhd -f<name> -s<col> -x -c -C<hex-id>",
        description: "sweep the heap and list per-class counts (-c clears)",
    },
    HelpEntry { verb: "lss", usage: "lss", description: "statistics summary" },
    HelpEntry {
        verb: "lsp",
        usage: "lsp [-s<file>]",
        description: "list properties; -s writes them to a file",
    },
    HelpEntry { verb: "lcf", usage: "lcf", description: "list configuration sources" },
    HelpEntry { verb: "dex", usage: "dex", description: "list exception counters" },
    HelpEntry { verb: "dt", usage: "dt [-s]", description: "list threads; -s with callstacks" },
    HelpEntry { verb: "gc", usage: "gc", description: "request a GC cycle from the runtime" },
    HelpEntry {
        verb: "reset",
        usage: "reset [-s]",
        description: "zero all counters; -s reloads the properties file",
    },
    HelpEntry {
        verb: "repeat",
        usage: "repeat [seconds]",
        description: "re-run the previous command periodically; 0 disarms",
    },
    HelpEntry {
        verb: "trace",
        usage: "trace add|remove <category> -e<ms> -m<bytes> -d<depth> -t<thread> -f<file> -ascii|-tree|-xml [names...]",
        description: "adjust trace categories (method, parameter, trigger, class, gc, contention, stack, thread, exception)",
    },
    HelpEntry { verb: "set", usage: "set key=value", description: "update one property" },
    HelpEntry { verb: "info", usage: "info", description: "monitor state summary" },
    HelpEntry { verb: "echo", usage: "echo [text]", description: "echo back" },
    HelpEntry { verb: "version", usage: "version", description: "show the monitor version" },
    HelpEntry { verb: "chpwd", usage: "chpwd <password>", description: "change the shell password" },
    HelpEntry { verb: "exit", usage: "exit", description: "close this session" },
];

/// The help tree, optionally restricted to one verb.
#[must_use]
pub fn help_tag(verb: Option<&str>) -> Tag {
    let mut root = Tag::new("List");
    root.put("Type", "Config");
    for entry in HELP {
        if verb.is_some_and(|v| v != entry.verb) {
            continue;
        }
        root.child("Command")
            .put("Command", entry.verb)
            .put("Attribute", entry.usage)
            .put("Description", entry.description);
    }
    root
}
