use cfg_aliases::cfg_aliases;

fn main() {
    cfg_aliases! {
        // Bare-metal Cortex-M build: the image a debug probe loads into RAM. The CMSIS entry
        // points and the device descriptor only exist here; host builds keep the driver alone.
        flash_algo: { all(target_arch = "arm", target_os = "none") },
    }
}
