use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "s3-squeeze",
    about = "Compress the images in an S3 bucket, in place",
    long_about = "s3-squeeze walks an S3 bucket and compresses every eligible image \
                  (JPEG, PNG, GIF, SVG) back into place, marking each object so it is \
                  never optimized twice. Batch sweeps run with parallel workers and a \
                  resumable marker; single objects can be processed reactively from \
                  storage notifications.",
    version = "0.1.0",
    after_help = "EXAMPLES:\n  \
    SOURCE_BUCKET=photos s3-squeeze run\n  \
    SOURCE_BUCKET=photos s3-squeeze event notification.json\n  \
    SOURCE_BUCKET=photos s3-squeeze optimize uploads/cat.jpg uploads/dog.png\n\n\
    Configuration is read from the environment (SOURCE_BUCKET, UPLOAD_BUCKET, \
    UPLOAD_ACL, PREFIX, EXCLUDE_PREFIX, MAX_FILE_SIZE, MAX_AGE, PNG_OPTIM_LEVEL, \
    JPG_OPTIM_PROGRESSIVE, GIF_OPTIM_INTERLACED)."
)]
pub struct Args {
    #[arg(short = 'q', long, global = true, help = "Suppress progress output")]
    pub quiet: bool,

    #[arg(short = 'v', long, global = true, help = "Show verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Sweep the whole bucket and optimize every eligible image",
        long_about = "Walks the configured bucket in listing order with one worker per \
                      CPU. Progress is persisted to a marker file and an append-only \
                      processed-keys log, so an interrupted sweep resumes where it \
                      left off. Per-object failures are counted and reported at the \
                      end without stopping the sweep."
    )]
    Run,

    #[command(
        about = "Process a batch of storage-creation notifications",
        long_about = "Reads an S3 event notification document and optimizes every \
                      object it names, concurrently. The first failure fails the \
                      whole batch."
    )]
    Event {
        #[arg(help = "Path to the notification JSON document ('-' reads stdin)")]
        input: String,
    },

    #[command(
        about = "Optimize specific object keys",
        long_about = "Runs the named keys through the single-object pipeline, one \
                      after another. Keys may be percent-encoded as they appear in \
                      storage notifications."
    )]
    Optimize {
        #[arg(required = true, help = "Object keys to optimize")]
        keys: Vec<String>,

        #[arg(
            short = 'b',
            long,
            help = "Bucket holding the keys (default: SOURCE_BUCKET)"
        )]
        bucket: Option<String>,
    },
}
